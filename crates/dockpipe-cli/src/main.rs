//! dockpipe - local deployment pipeline
//!
//! Validates the project tree, builds the service image and drives the
//! compose test stack.
//!
//! ## Commands
//!
//! - `validate`: run the pre-build check battery and print the score
//! - `build`: build and verify the image, releasing temporary resources
//! - `setup` / `start` / `stop` / `restart` / `build-and-start`: stack lifecycle
//! - `status`: per-service health and the application's `/health` endpoint
//! - `logs`: follow service logs
//! - `test`: run the one-shot test-runner service
//! - `cleanup`: remove the stack, its volumes and images

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use dockpipe_core::host::format_bytes;
use dockpipe_core::{
    init_tracing, level_for_verbosity, BuildConfig, BuildExecutor, BuildMode, BuildOutcome,
    EnvFileStatus, ErrorClass, Outcome, OverallHealth, PipelineConfig, PipelineError,
    ProbeResult, ServiceOrchestrator, SmokeResult, StackState, StatusReport, ValidationReport,
    Validator, Verdict,
};
use dockpipe_engine::{BuildEngine, DockerCli, DockerCompose, PythonInterpreter};

#[derive(Parser)]
#[command(name = "dockpipe")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate, build and run the chat service stack locally", long_about = None)]
struct Cli {
    /// Project root
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Config file (default: dockpipe.toml in the project root, when present)
    #[arg(long, global = true, env = "DOCKPIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pre-build check battery
    Validate {
        /// Platform the image is built for, e.g. linux/arm64
        #[arg(long)]
        platform: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Build and verify the service image
    Build {
        /// Image tag (default: build.default_tag from the config)
        tag: Option<String>,

        /// Build context (default: the project root)
        context: Option<PathBuf>,

        /// Recipe stage to build
        target: Option<String>,

        /// development, production or test
        #[arg(long, env = "BUILD_MODE", default_value = "development")]
        mode: BuildMode,

        /// Target platform, e.g. linux/amd64
        #[arg(long)]
        platform: Option<String>,

        /// Build without the layer cache
        #[arg(long)]
        no_cache: bool,

        /// Run `validate` first and refuse to build on FAIL
        #[arg(long)]
        validate: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Create the env file if needed, rebuild and start the stack
    Setup,

    /// Start the stack
    Start,

    /// Stop the stack, keeping volumes
    Stop,

    /// Stop, wait, start
    Restart,

    /// Rebuild all service images without cache, then start
    BuildAndStart,

    /// Show per-service health
    Status {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Follow logs until Ctrl-C
    Logs {
        /// Single service (default: all)
        service: Option<String>,
    },

    /// Run the test-runner service against the running stack
    Test,

    /// Remove the stack, its volumes and the service images
    Cleanup,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json, level_for_verbosity(cli.verbose));

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let project = cli
        .project
        .canonicalize()
        .with_context(|| format!("Project directory {} not found", cli.project.display()))?;
    let config = match PipelineConfig::load(&project, cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return Ok(fail(&e)),
    };
    debug!(project = %project.display(), "Resolved project");

    match cli.command {
        Commands::Validate { platform, output } => {
            cmd_validate(&project, config, platform, output).await
        }
        Commands::Build {
            tag,
            context,
            target,
            mode,
            platform,
            no_cache,
            validate,
            output,
        } => {
            let request = build_request(&project, &config, tag, context, target, mode, platform, no_cache);
            cmd_build(&project, config, request, validate, output).await
        }
        Commands::Setup => cmd_setup(&project, &config).await,
        Commands::Start => cmd_start(&project, &config).await,
        Commands::Stop => cmd_stop(&project, &config).await,
        Commands::Restart => cmd_restart(&project, &config).await,
        Commands::BuildAndStart => cmd_build_and_start(&project, &config).await,
        Commands::Status { output } => cmd_status(&project, &config, output).await,
        Commands::Logs { service } => cmd_logs(&project, &config, service.as_deref()).await,
        Commands::Test => cmd_test(&project, &config).await,
        Commands::Cleanup => cmd_cleanup(&project, &config).await,
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

fn class_label(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::FatalEnvironment => "environment",
        ErrorClass::FatalConfig => "configuration",
        ErrorClass::FatalExecution => "execution",
        ErrorClass::Interrupted => "interrupted",
    }
}

/// Process exit status for a fatal error.
fn exit_status(err: &PipelineError) -> u8 {
    match err.class() {
        ErrorClass::Interrupted => 130,
        _ => 1,
    }
}

fn fail(err: &PipelineError) -> ExitCode {
    eprintln!();
    eprintln!("✗ {}", err);
    eprintln!("  kind: {}", class_label(err.class()));
    eprintln!("  fix:  {}", err.hint());
    ExitCode::from(exit_status(err))
}

fn short_id(id: &str) -> &str {
    let bare = id.strip_prefix("sha256:").unwrap_or(id);
    &bare[..12.min(bare.len())]
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("{}m{:02}s", (secs / 60.0) as u64, (secs % 60.0) as u64)
    } else {
        format!("{:.1}s", secs)
    }
}

// ---------------------------------------------------------------------------
// validate / build
// ---------------------------------------------------------------------------

fn validator(project: &Path, config: PipelineConfig, engine: Arc<dyn BuildEngine>) -> Validator {
    Validator::new(project, config, engine, Arc::new(PythonInterpreter::new()))
}

fn print_report(report: &ValidationReport) {
    println!("Validation results:");
    for result in report.results() {
        println!(
            "  {} {:<32} {}",
            result.outcome().symbol(),
            result.name(),
            result.message()
        );
        if result.outcome() != Outcome::Pass {
            if let Some(hint) = result.hint() {
                println!("      → {}", hint);
            }
        }
    }
    println!();
    let verdict = report.verdict();
    println!(
        "Passed {}/{} ({}%), {} warning(s): {}",
        report.passed(),
        report.total(),
        report.success_rate(),
        report.warnings(),
        verdict.label()
    );
    match verdict {
        Verdict::Pass => {}
        Verdict::PassWithWarnings => {
            println!("Review the warnings above before deploying.")
        }
        Verdict::Fail => println!("Fix the findings above, then re-run `dockpipe validate`."),
    }
}

async fn cmd_validate(
    project: &Path,
    config: PipelineConfig,
    platform: Option<String>,
    output: OutputFormat,
) -> Result<ExitCode> {
    let engine = Arc::new(DockerCli::new().in_dir(project));
    let report = match validator(project, config, engine)
        .with_platform(platform)
        .run()
        .await
    {
        Ok(r) => r,
        Err(e) => return Ok(fail(&e)),
    };

    match output {
        OutputFormat::Json => {
            let doc = serde_json::json!({
                "success_rate": report.success_rate(),
                "verdict": report.verdict(),
                "report": &report,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        OutputFormat::Text => print_report(&report),
    }
    Ok(if report.verdict().is_passing() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[allow(clippy::too_many_arguments)]
fn build_request(
    project: &Path,
    config: &PipelineConfig,
    tag: Option<String>,
    context: Option<PathBuf>,
    target: Option<String>,
    mode: BuildMode,
    platform: Option<String>,
    no_cache: bool,
) -> BuildConfig {
    let context = match context {
        Some(c) if c.is_absolute() => c,
        Some(c) => project.join(c),
        None => project.to_path_buf(),
    };
    BuildConfig::builder(
        tag.unwrap_or_else(|| config.build.default_tag.clone()),
        context,
    )
    .mode(mode)
    .target(target)
    .platform(platform)
    .no_cache(no_cache)
    .build()
}

fn print_outcome(outcome: &BuildOutcome) {
    println!("✓ Built {}", outcome.tag);
    println!("  Image:    {}", short_id(&outcome.image_id));
    println!("  Size:     {}", format_bytes(outcome.size_bytes));
    println!("  Elapsed:  {}", format_elapsed(outcome.elapsed));
    match &outcome.smoke {
        SmokeResult::Passed(out) => println!("  Smoke:    ✓ {}", out),
        SmokeResult::Failed(out) => println!("  Smoke:    ⚠ failed: {}", out),
    }
    if let Some(ctx) = &outcome.context {
        println!(
            "  Context:  {} in {} files (fingerprint {})",
            format_bytes(ctx.total_bytes),
            ctx.file_count,
            &ctx.fingerprint[..12]
        );
    }
    println!(
        "  Cleanup:  {} temp file(s), {} intermediate image(s) removed",
        outcome.cleanup.removed_files, outcome.cleanup.removed_images
    );
    if let Some(bytes) = outcome.cleanup.cache_over_threshold {
        println!(
            "  ⚠ Build cache holds {}; reclaim with `docker builder prune`",
            format_bytes(bytes)
        );
    }
    println!("  Next:     {}", outcome.guidance());
}

async fn cmd_build(
    project: &Path,
    config: PipelineConfig,
    request: BuildConfig,
    validate: bool,
    output: OutputFormat,
) -> Result<ExitCode> {
    let engine: Arc<dyn BuildEngine> = Arc::new(DockerCli::new().in_dir(project));
    let mut executor = BuildExecutor::new(engine.clone(), config.clone());
    if validate {
        executor = executor.with_gate(
            validator(project, config, engine).with_platform(request.platform().map(String::from)),
        );
    }

    if output == OutputFormat::Text {
        println!(
            "Building {} from {} ({} mode)",
            request.tag(),
            request.context().display(),
            request.mode()
        );
    }
    match executor.execute(&request).await {
        Ok(outcome) => {
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
                OutputFormat::Text => print_outcome(&outcome),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(fail(&e)),
    }
}

// ---------------------------------------------------------------------------
// Stack lifecycle
// ---------------------------------------------------------------------------

fn orchestrator(project: &Path, config: &PipelineConfig) -> ServiceOrchestrator {
    let compose = DockerCompose::new(project, &config.stack.compose_file)
        .with_env_file(&config.stack.env_file);
    ServiceOrchestrator::new(Arc::new(compose), project, config.stack.clone())
}

fn require_compose_file(project: &Path, config: &PipelineConfig) -> Result<(), PipelineError> {
    let path = config.compose_path(project);
    if path.is_file() {
        return Ok(());
    }
    Err(PipelineError::config(
        "compose file",
        format!("{} does not exist", path.display()),
        "set stack.compose_file in dockpipe.toml or create the file",
    ))
}

fn report_ports(conflicts: &[u16]) {
    for port in conflicts {
        println!("⚠ Port {} is already in use; the stack may fail to bind it", port);
    }
}

async fn cmd_setup(project: &Path, config: &PipelineConfig) -> Result<ExitCode> {
    if let Err(e) = require_compose_file(project, config) {
        return Ok(fail(&e));
    }
    let mut orch = orchestrator(project, config);
    report_ports(&orch.port_conflicts().await);
    match orch.setup().await {
        Ok((env, _)) => {
            let env_path = config.env_path(project);
            match env {
                EnvFileStatus::Present => println!("✓ Env file {}", env_path.display()),
                EnvFileStatus::CreatedFromTemplate => println!(
                    "⚠ Created {} from {}; review its values",
                    env_path.display(),
                    config.stack.env_template
                ),
                EnvFileStatus::Missing => println!(
                    "⚠ No {} and no {} to copy; compose uses its defaults",
                    config.stack.env_file, config.stack.env_template
                ),
            }
            println!("✓ Stack built and started");
            println!("  Next: dockpipe status, then dockpipe test");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(fail(&e)),
    }
}

async fn cmd_start(project: &Path, config: &PipelineConfig) -> Result<ExitCode> {
    if let Err(e) = require_compose_file(project, config) {
        return Ok(fail(&e));
    }
    let mut orch = orchestrator(project, config);
    report_ports(&orch.port_conflicts().await);
    match orch.start().await {
        Ok(_) => {
            println!("✓ Services started");
            println!("  Health checks need a few seconds; run `dockpipe status`.");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(fail(&e)),
    }
}

async fn cmd_stop(project: &Path, config: &PipelineConfig) -> Result<ExitCode> {
    let mut orch = orchestrator(project, config);
    match orch.stop().await {
        StackState::StoppedWithErrors => {
            println!("⚠ Services stopped with errors; see the log above")
        }
        _ => println!("✓ Services stopped"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_restart(project: &Path, config: &PipelineConfig) -> Result<ExitCode> {
    if let Err(e) = require_compose_file(project, config) {
        return Ok(fail(&e));
    }
    let mut orch = orchestrator(project, config);
    match orch.restart().await {
        Ok(_) => {
            println!("✓ Services restarted");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(fail(&e)),
    }
}

async fn cmd_build_and_start(project: &Path, config: &PipelineConfig) -> Result<ExitCode> {
    if let Err(e) = require_compose_file(project, config) {
        return Ok(fail(&e));
    }
    let mut orch = orchestrator(project, config);
    report_ports(&orch.port_conflicts().await);
    match orch.build_and_start().await {
        Ok(_) => {
            println!("✓ Images rebuilt and services started");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(fail(&e)),
    }
}

fn print_status(report: &StatusReport) {
    println!("Service status:");
    for snap in &report.services {
        println!(
            "  {} {:<16} {}",
            snap.state.symbol(),
            snap.service,
            snap.status_text
        );
    }
    match &report.endpoint {
        Some(ProbeResult::Reachable { url, status }) => {
            let mark = if (200..300).contains(status) { "✓" } else { "✗" };
            println!("  {} {:<16} HTTP {} ({})", mark, "endpoint", status, url);
        }
        Some(ProbeResult::Unreachable { url, reason }) => {
            println!("  ✗ {:<16} {} ({})", "endpoint", reason, url)
        }
        None => {}
    }
    println!();
    match report.overall {
        OverallHealth::Healthy => println!("All critical services are healthy."),
        OverallHealth::NotReady if report.state == StackState::Stopped => {
            println!("Stack is not running. Start it with `dockpipe start`.")
        }
        OverallHealth::NotReady => {
            println!("Some services are not ready yet; run `dockpipe status` again shortly.")
        }
    }
}

async fn cmd_status(project: &Path, config: &PipelineConfig, output: OutputFormat) -> Result<ExitCode> {
    let report = orchestrator(project, config).status().await;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_status(&report),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_logs(project: &Path, config: &PipelineConfig, service: Option<&str>) -> Result<ExitCode> {
    if let Err(e) = require_compose_file(project, config) {
        return Ok(fail(&e));
    }
    match orchestrator(project, config).logs(service).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => Ok(fail(&e)),
    }
}

async fn cmd_test(project: &Path, config: &PipelineConfig) -> Result<ExitCode> {
    if let Err(e) = require_compose_file(project, config) {
        return Ok(fail(&e));
    }
    match orchestrator(project, config).test().await {
        Ok(report) if report.passed => {
            println!("✓ Tests passed in {}", format_elapsed(report.elapsed));
            Ok(ExitCode::SUCCESS)
        }
        Ok(report) => {
            println!(
                "✗ Tests failed (exit code {}) after {}",
                report.exit_code,
                format_elapsed(report.elapsed)
            );
            println!("  Inspect with `dockpipe logs {}`", config.stack.test_runner_service);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(fail(&e)),
    }
}

async fn cmd_cleanup(project: &Path, config: &PipelineConfig) -> Result<ExitCode> {
    let report = orchestrator(project, config).cleanup().await;
    println!(
        "{} Stack {}",
        if report.stack_removed { "✓" } else { "⚠" },
        if report.stack_removed {
            "and volumes removed"
        } else {
            "removal reported errors"
        }
    );
    println!("✓ {} image(s) removed", report.images_removed);
    if report.pruned {
        println!("✓ Unreferenced engine resources pruned");
    }
    for failure in &report.failures {
        println!("⚠ {}", failure);
    }
    Ok(ExitCode::SUCCESS)
}
