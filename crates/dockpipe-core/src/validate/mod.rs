//! Pre-build validation.
//!
//! The [`Validator`] runs its check groups in a fixed order and accumulates
//! every result into a [`ValidationReport`]:
//!
//! 1. environment (engine installed, daemon, version, buildx, disk)
//! 2. required and optional files
//! 3. source syntax
//! 4. dependency manifest
//! 5. build recipe
//! 6. build context
//! 7. security heuristics
//! 8. compatibility
//!
//! A fatal check records its `Fail` result and returns an error at once; no
//! later group runs and no verdict is computed. Everything else only moves
//! the score.

mod build_context;
mod compat;
pub mod dependencies;
mod environment;
mod files;
pub mod recipe;
mod report;
mod security;
mod syntax;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dockpipe_engine::{BuildEngine, SyntaxChecker};
use tracing::{info, info_span, Instrument};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

pub use compat::normalize_arch;
pub use report::{CheckResult, Outcome, ValidationReport, Verdict};
pub use security::find_credentials;

/// Borrowed inputs shared by every check group.
pub(crate) struct Scope<'a> {
    pub project_dir: &'a Path,
    pub config: &'a PipelineConfig,
    pub engine: &'a dyn BuildEngine,
    pub interpreter: &'a dyn SyntaxChecker,
    pub platform: Option<&'a str>,
}

/// Record a failed check and build the matching fatal error.
pub(crate) fn fatal_config(
    report: &mut ValidationReport,
    check: &str,
    message: String,
    hint: String,
) -> PipelineError {
    report.record(CheckResult::fail(check, message.clone(), hint.clone()));
    PipelineError::config(check, message, hint)
}

/// Leading `major.minor` of a version string such as `24.0.7` or `3.11-slim`.
pub(crate) fn parse_major_minor(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.trim().trim_start_matches('v').split('.');
    let major = parts.next()?.parse().ok()?;
    let minor_digits: String = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some((major, minor_digits.parse().ok()?))
}

/// Runs the check battery for one project tree.
pub struct Validator {
    project_dir: PathBuf,
    config: PipelineConfig,
    engine: Arc<dyn BuildEngine>,
    interpreter: Arc<dyn SyntaxChecker>,
    platform: Option<String>,
}

impl Validator {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        config: PipelineConfig,
        engine: Arc<dyn BuildEngine>,
        interpreter: Arc<dyn SyntaxChecker>,
    ) -> Self {
        Self {
            project_dir: project_dir.into(),
            config,
            engine,
            interpreter,
            platform: None,
        }
    }

    /// Target platform compared against the engine architecture.
    pub fn with_platform(mut self, platform: Option<String>) -> Self {
        self.platform = platform;
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Run every group. `Err` means a fatal check aborted the run.
    pub async fn run(&self) -> Result<ValidationReport> {
        let span = info_span!("validate", project = %self.project_dir.display());
        async {
            let scope = Scope {
                project_dir: &self.project_dir,
                config: &self.config,
                engine: self.engine.as_ref(),
                interpreter: self.interpreter.as_ref(),
                platform: self.platform.as_deref(),
            };
            let mut report = ValidationReport::new();

            let server = environment::check(&scope, &mut report).await?;
            files::check(&scope, &mut report)?;
            syntax::check(&scope, &mut report).await?;
            dependencies::check(&scope, &mut report)?;
            recipe::check(&scope, &mut report)?;
            let analysis = build_context::check(&scope, &mut report);
            security::check(&scope, analysis.as_ref(), &mut report);
            compat::check(&scope, &server, &mut report).await;

            info!(
                passed = report.passed(),
                total = report.total(),
                warnings = report.warnings(),
                rate = report.success_rate(),
                verdict = report.verdict().label(),
                "Validation finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_major_minor() {
        assert_eq!(parse_major_minor("24.0.7"), Some((24, 0)));
        assert_eq!(parse_major_minor("20.10"), Some((20, 10)));
        assert_eq!(parse_major_minor("3.11-slim"), Some((3, 11)));
        assert_eq!(parse_major_minor("v1.2"), Some((1, 2)));
        assert_eq!(parse_major_minor("slim"), None);
        assert_eq!(parse_major_minor("3"), None);
    }

    #[test]
    fn test_version_ordering_is_numeric() {
        assert!(parse_major_minor("20.9").unwrap() < parse_major_minor("20.10").unwrap());
    }
}
