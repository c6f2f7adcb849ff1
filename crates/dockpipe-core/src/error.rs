//! Pipeline error taxonomy.
//!
//! Every fatal path carries the failing check or step and a remediation hint
//! the CLI prints before exiting non-zero. Advisory findings never become
//! errors; they live in the validation report as `Warn` results.

use dockpipe_engine::EngineError;

/// Coarse class of a [`PipelineError`], used for diagnostics and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Engine missing or unreachable; nothing was acquired yet.
    FatalEnvironment,
    /// Bad project tree, recipe, tag or context; aborts before any engine call.
    FatalConfig,
    /// The engine ran and failed; cleanup was attempted.
    FatalExecution,
    /// Operator interrupt during a build or lifecycle action.
    Interrupted,
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{check}: {message}")]
    FatalEnvironment {
        check: String,
        message: String,
        hint: String,
    },

    #[error("{check}: {message}")]
    FatalConfig {
        check: String,
        message: String,
        hint: String,
    },

    #[error("{step} failed: {message}")]
    FatalExecution {
        step: String,
        message: String,
        hint: String,
    },

    #[error("interrupted during {step}")]
    Interrupted { step: String },

    #[error("validation gate failed: success rate {rate}% with {warnings} warning(s)")]
    GateFailed { rate: u32, warnings: usize },

    #[error("service '{service}' is not running")]
    StackNotRunning { service: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn environment(
        check: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        PipelineError::FatalEnvironment {
            check: check.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn config(
        check: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        PipelineError::FatalConfig {
            check: check.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn execution(
        step: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        PipelineError::FatalExecution {
            step: step.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Map an adapter failure during `step` into the taxonomy.
    pub fn from_engine(step: &str, err: EngineError) -> Self {
        match err {
            EngineError::NotInstalled { program } => PipelineError::environment(
                "engine installed",
                format!("{} is not installed or not in PATH", program),
                "install Docker Engine: https://docs.docker.com/engine/install/",
            ),
            EngineError::DaemonUnreachable(detail) => PipelineError::environment(
                "daemon reachable",
                if detail.is_empty() {
                    "the Docker daemon did not answer".to_string()
                } else {
                    detail
                },
                "start the daemon: sudo systemctl start docker",
            ),
            other => PipelineError::execution(
                step,
                other.to_string(),
                "inspect the engine output above and re-run",
            ),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::FatalEnvironment { .. } => ErrorClass::FatalEnvironment,
            PipelineError::FatalConfig { .. }
            | PipelineError::GateFailed { .. }
            | PipelineError::StackNotRunning { .. } => ErrorClass::FatalConfig,
            PipelineError::FatalExecution { .. } | PipelineError::Io(_) => {
                ErrorClass::FatalExecution
            }
            PipelineError::Interrupted { .. } => ErrorClass::Interrupted,
        }
    }

    /// Concrete follow-up command for the operator.
    pub fn hint(&self) -> String {
        match self {
            PipelineError::FatalEnvironment { hint, .. }
            | PipelineError::FatalConfig { hint, .. }
            | PipelineError::FatalExecution { hint, .. } => hint.clone(),
            PipelineError::Interrupted { .. } => {
                "re-run the command; temporary build resources were released".to_string()
            }
            PipelineError::GateFailed { .. } => {
                "run `dockpipe validate` and address the reported findings".to_string()
            }
            PipelineError::StackNotRunning { .. } => {
                "start the stack first: dockpipe start".to_string()
            }
            PipelineError::Io(_) => "check file permissions and free space".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_to_environment() {
        let err = PipelineError::from_engine(
            "pre-flight",
            EngineError::NotInstalled {
                program: "docker".to_string(),
            },
        );
        assert_eq!(err.class(), ErrorClass::FatalEnvironment);
        assert!(err.hint().contains("install"));

        let err = PipelineError::from_engine(
            "pre-flight",
            EngineError::DaemonUnreachable(String::new()),
        );
        assert_eq!(err.class(), ErrorClass::FatalEnvironment);
        assert!(err.to_string().contains("did not answer"));
    }

    #[test]
    fn test_other_engine_errors_map_to_execution() {
        let err = PipelineError::from_engine(
            "verification",
            EngineError::Parse("garbage".to_string()),
        );
        assert_eq!(err.class(), ErrorClass::FatalExecution);
        assert!(err.to_string().starts_with("verification failed"));
    }

    #[test]
    fn test_stack_not_running_hint() {
        let err = PipelineError::StackNotRunning {
            service: "app".to_string(),
        };
        assert!(err.hint().contains("dockpipe start"));
    }
}
