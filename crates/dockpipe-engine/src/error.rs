//! Error types for dockpipe-engine

use thiserror::Error;

/// Errors raised while talking to the container engine or interpreter
#[derive(Error, Debug)]
pub enum EngineError {
    /// Executable not found on PATH
    #[error("{program} is not installed or not in PATH")]
    NotInstalled { program: String },

    /// Client is present but the daemon does not answer
    #[error("container daemon is not reachable: {0}")]
    DaemonUnreachable(String),

    /// A query command exited non-zero
    #[error("`{command}` exited with code {exit_code}: {output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    /// Bounded command ran past its deadline
    #[error("`{command}` timed out after {seconds} seconds")]
    Timeout { command: String, seconds: u64 },

    /// Output did not match the engine's documented format
    #[error("unexpected engine output: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// True when the failure means the engine cannot be used at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            EngineError::NotInstalled { .. } | EngineError::DaemonUnreachable(_)
        )
    }
}
