//! Dockpipe-Engine: adapters over the container engine and host interpreter
//!
//! Everything in dockpipe that spawns an external process lives here. The
//! orchestration crates only see the narrow traits below and the typed
//! results they return, so they can be exercised against the in-memory
//! fakes in [`fakes`].
//!
//! ## Key Components
//!
//! - `BuildEngine`: image build, inspection, smoke run and pruning
//! - `ComposeEngine`: lifecycle of the declared multi-service stack
//! - `SyntaxChecker`: source parsing through the host interpreter
//! - `DockerCli` / `DockerCompose` / `PythonInterpreter`: the real backends

pub mod compose;
pub mod docker;
mod error;
pub mod fakes;
pub mod interpreter;
mod process;
pub mod traits;
mod types;

pub use compose::DockerCompose;
pub use docker::DockerCli;
pub use error::EngineError;
pub use interpreter::PythonInterpreter;
pub use traits::{BuildEngine, ComposeEngine, SyntaxChecker};
pub use types::{
    parse_human_size, CommandOutput, ImageMetadata, ImageSummary, ServerInfo, ServiceContainer,
};

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
