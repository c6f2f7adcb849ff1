//! Dockpipe Core Library
//!
//! The three pipeline components and what they share:
//!
//! - [`Validator`]: scored pre-build checks with fatal short-circuits
//! - [`BuildExecutor`]: image build with guaranteed cleanup
//! - [`ServiceOrchestrator`]: compose stack lifecycle and health
//!
//! Engines are injected as `dockpipe_engine` trait objects, so every
//! component runs unchanged against the in-memory fakes.

pub mod build;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod telemetry;
pub mod validate;

pub use build::{
    BuildConfig, BuildConfigBuilder, BuildExecutor, BuildMode, BuildOutcome, CleanupRegistry,
    CleanupReport, SmokeResult,
};
pub use config::{PipelineConfig, CONFIG_FILE};
pub use context::ContextReport;
pub use error::{ErrorClass, PipelineError, Result};
pub use orchestrator::{
    EnvFileStatus, HealthState, OverallHealth, ProbeResult, ServiceHealthSnapshot,
    ServiceOrchestrator, ServiceSpec, StackState, StatusReport, TeardownReport, TestReport,
};
pub use telemetry::{init_tracing, level_for_verbosity};
pub use validate::{CheckResult, Outcome, ValidationReport, Validator, Verdict};
