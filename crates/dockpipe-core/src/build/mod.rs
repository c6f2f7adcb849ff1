//! Image build execution.
//!
//! [`BuildExecutor::execute`] runs the stages pre-flight, context analysis,
//! argument assembly, execution, verification and reporting. The whole
//! pipeline races the interrupt signal; whichever finishes first, the
//! cleanup registry is drained exactly once afterwards.

mod cleanup;
mod config;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dockpipe_engine::BuildEngine;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::context::{self, ContextOptions, ContextReport};
use crate::error::{PipelineError, Result};
use crate::host::{self, format_bytes};
use crate::validate::recipe::Recipe;
use crate::validate::Validator;

pub use cleanup::{CleanupRegistry, CleanupReport};
pub use config::{assemble_args, ArgsContext, BuildConfig, BuildConfigBuilder, BuildMode};

/// Result of the post-build smoke run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SmokeResult {
    Passed(String),
    Failed(String),
}

impl SmokeResult {
    pub fn passed(&self) -> bool {
        matches!(self, SmokeResult::Passed(_))
    }
}

/// A verified image. Only produced when the engine succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub run_id: Uuid,
    pub tag: String,
    pub mode: BuildMode,
    pub image_id: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub success: bool,
    pub smoke: SmokeResult,
    pub context: Option<ContextReport>,
    pub cleanup: CleanupReport,
}

impl BuildOutcome {
    /// Suggested next step for the mode.
    pub fn guidance(&self) -> String {
        match self.mode {
            BuildMode::Development => {
                "bring up the test stack with `dockpipe start`, then `dockpipe test`".to_string()
            }
            BuildMode::Test => format!(
                "run the suite in the image: docker run --rm {} pytest",
                self.tag
            ),
            BuildMode::Production => format!(
                "image built without cache; tag and push {} with your registry tooling",
                self.tag
            ),
        }
    }
}

/// Resolves once the operator presses Ctrl-C. Never resolves when the
/// handler cannot be installed.
pub async fn interrupt_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Builds one image per invocation.
pub struct BuildExecutor {
    engine: Arc<dyn BuildEngine>,
    config: PipelineConfig,
    gate: Option<Validator>,
}

impl BuildExecutor {
    pub fn new(engine: Arc<dyn BuildEngine>, config: PipelineConfig) -> Self {
        Self {
            engine,
            config,
            gate: None,
        }
    }

    /// Run `validator` during pre-flight and refuse to build on a failing
    /// verdict.
    pub fn with_gate(mut self, validator: Validator) -> Self {
        self.gate = Some(validator);
        self
    }

    /// Build, aborting cleanly on Ctrl-C.
    pub async fn execute(&self, request: &BuildConfig) -> Result<BuildOutcome> {
        self.execute_until(request, interrupt_signal()).await
    }

    /// Build, treating completion of `interrupt` as an operator interrupt.
    pub async fn execute_until<F>(&self, request: &BuildConfig, interrupt: F) -> Result<BuildOutcome>
    where
        F: Future<Output = ()>,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("build", %run_id, tag = %request.tag(), mode = %request.mode());
        async move {
            let started = Instant::now();
            let mut registry = CleanupRegistry::new(Utc::now());

            let result = tokio::select! {
                biased;
                _ = interrupt => None,
                r = self.run_stages(request, &mut registry, run_id, started) => Some(r),
            };
            let result = result.unwrap_or_else(|| {
                warn!(stage = registry.stage(), "Interrupted; releasing build resources");
                Err(PipelineError::Interrupted {
                    step: registry.stage().to_string(),
                })
            });

            let cleanup = registry
                .drain(self.engine.as_ref(), self.config.build.cache_warn_bytes)
                .await;

            match result {
                Ok(mut outcome) => {
                    outcome.cleanup = cleanup;
                    Ok(outcome)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        cleanup_failures = cleanup.failures.len(),
                        "Build failed"
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        request: &BuildConfig,
        registry: &mut CleanupRegistry,
        run_id: Uuid,
        started: Instant,
    ) -> Result<BuildOutcome> {
        registry.enter("pre-flight");
        self.preflight(request).await?;

        registry.enter("context analysis");
        let context = self.analyze_context(request);

        registry.enter("configuration");
        let buildx = self.engine.has_buildx().await;
        let iidfile = tempfile::Builder::new()
            .prefix("dockpipe-")
            .suffix(".iid")
            .tempfile()?
            .into_temp_path()
            .keep()
            .map_err(|e| PipelineError::Io(e.error))?;
        registry.register_temp_file(&iidfile);

        let recipe_name = &self.config.project.recipe_file;
        let custom_recipe: Option<PathBuf> =
            (recipe_name != "Dockerfile").then(|| request.context().join(recipe_name));
        let args = assemble_args(
            request,
            &ArgsContext {
                buildx,
                iidfile: &iidfile,
                recipe: custom_recipe.as_deref(),
            },
        );
        tracing::debug!(argv = ?args, "Assembled build arguments");

        registry.enter("execution");
        info!(cache = request.cache_enabled(), "Starting image build");
        let build_started = Instant::now();
        let output = self
            .engine
            .build(&args)
            .await
            .map_err(|e| PipelineError::from_engine("build", e))?;
        let build_elapsed = build_started.elapsed();
        if !output.success() {
            return Err(PipelineError::execution(
                "build",
                format!(
                    "engine exited with code {} after {:.1}s",
                    output.exit_code,
                    build_elapsed.as_secs_f64()
                ),
                "fix the error in the build output above, or retry with --no-cache",
            ));
        }

        registry.enter("verification");
        let meta = self
            .engine
            .inspect_image(request.tag())
            .await
            .map_err(|e| PipelineError::from_engine("verification", e))?
            .ok_or_else(|| {
                PipelineError::execution(
                    "verification",
                    format!("no image tagged {} after a successful build", request.tag()),
                    format!("inspect `docker images {}`", request.tag()),
                )
            })?;
        if let Ok(id) = std::fs::read_to_string(&iidfile) {
            if !id.trim().is_empty() && id.trim() != meta.id {
                warn!(built = %id.trim(), tagged = %meta.id, "Tag points at a different image than the one built");
            }
        }
        let smoke = self.smoke(request.tag()).await;

        registry.enter("reporting");
        info!(
            image = %meta.short_id(),
            size = %format_bytes(meta.size_bytes),
            elapsed_secs = build_elapsed.as_secs_f64(),
            "Image built and verified"
        );
        Ok(BuildOutcome {
            run_id,
            tag: request.tag().to_string(),
            mode: request.mode(),
            image_id: meta.id,
            size_bytes: meta.size_bytes,
            created_at: meta.created_at,
            elapsed: started.elapsed(),
            success: true,
            smoke,
            context,
            cleanup: CleanupReport::default(),
        })
    }

    /// Local checks come first so a bad request never reaches the engine.
    async fn preflight(&self, request: &BuildConfig) -> Result<()> {
        if request.tag().is_empty() {
            return Err(PipelineError::config(
                "tag",
                "image tag is empty",
                "pass a tag, e.g. `dockpipe build chatbot:dev`",
            ));
        }
        let context = request.context();
        if !context.is_dir() {
            return Err(PipelineError::config(
                "context",
                format!("build context {} does not exist", context.display()),
                "pass an existing directory as the build context",
            ));
        }
        let recipe_file = &self.config.project.recipe_file;
        let recipe_path = context.join(recipe_file);
        if !recipe_path.is_file() {
            return Err(PipelineError::config(
                "build recipe",
                format!("no {} in {}", recipe_file, context.display()),
                format!("add a {} to the build context", recipe_file),
            ));
        }
        if let Some(target) = request.target() {
            let recipe = Recipe::read(&recipe_path)?;
            if !recipe.stages().iter().any(|s| *s == target) {
                return Err(PipelineError::config(
                    "build target",
                    format!("{} declares no stage named '{}'", recipe_file, target),
                    format!("add `FROM ... AS {}` or choose another --target", target),
                ));
            }
        }

        self.engine
            .client_version()
            .await
            .map_err(|e| PipelineError::from_engine("pre-flight", e))?;
        let server = self
            .engine
            .server_info()
            .await
            .map_err(|e| PipelineError::from_engine("pre-flight", e))?;
        info!(engine = %server.version, arch = %server.arch, "Engine available");

        let min_disk = self.config.validation.min_free_disk_bytes;
        match host::free_disk_bytes(context) {
            Some(free) if free < min_disk => warn!(
                free = %format_bytes(free),
                "Low disk space; the build may fail"
            ),
            Some(_) => {}
            None => warn!("Cannot determine free disk space"),
        }
        let memory = host::available_memory_bytes();
        if memory < self.config.build.min_free_memory_bytes {
            warn!(available = %format_bytes(memory), "Low available memory; the build may be slow");
        }

        if let Some(validator) = &self.gate {
            let report = validator.run().await?;
            let verdict = report.verdict();
            info!(rate = report.success_rate(), verdict = verdict.label(), "Validation gate");
            if !verdict.is_passing() {
                return Err(PipelineError::GateFailed {
                    rate: report.success_rate(),
                    warnings: report.warnings(),
                });
            }
        }
        Ok(())
    }

    fn analyze_context(&self, request: &BuildConfig) -> Option<ContextReport> {
        let opts = ContextOptions {
            ignore_file: &self.config.project.ignore_file,
            large_file_bytes: self.config.validation.large_file_bytes,
            recommended_patterns: &self.config.validation.recommended_ignore_patterns,
        };
        match context::analyze(request.context(), &opts) {
            Ok(report) => {
                info!(
                    size = %format_bytes(report.total_bytes),
                    files = report.file_count,
                    fingerprint = %&report.fingerprint[..12],
                    "Build context"
                );
                if !report.ignore_file_present {
                    warn!("No {} in the build context", self.config.project.ignore_file);
                }
                for file in &report.large_files {
                    warn!(file = %file.path.display(), size = %format_bytes(file.size_bytes), "Large file in build context");
                }
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Could not analyze build context");
                None
            }
        }
    }

    async fn smoke(&self, tag: &str) -> SmokeResult {
        let command = &self.config.build.smoke_command;
        match self
            .engine
            .run_smoke(tag, command, self.config.smoke_timeout())
            .await
        {
            Ok(out) if out.success() => {
                info!(output = %out.output.trim(), "Smoke test passed");
                SmokeResult::Passed(out.output.trim().to_string())
            }
            Ok(out) => {
                warn!(exit_code = out.exit_code, "Smoke test failed");
                SmokeResult::Failed(out.output.trim().to_string())
            }
            Err(e) => {
                warn!(error = %e, "Smoke test could not run");
                SmokeResult::Failed(e.to_string())
            }
        }
    }
}
