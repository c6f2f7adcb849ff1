//! Subprocess execution shared by every adapter.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::error::EngineError;
use crate::types::CommandOutput;
use crate::EngineResult;

/// How a command's output reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputMode {
    /// Collect stdout + stderr into `CommandOutput::output`.
    Captured,
    /// Inherit the terminal so the operator sees output as it happens.
    Streamed,
}

/// A single invocation of an external program.
#[derive(Debug, Clone)]
pub(crate) struct Invocation<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub cwd: Option<&'a Path>,
    pub timeout: Option<Duration>,
    pub mode: OutputMode,
}

impl<'a> Invocation<'a> {
    pub fn captured(program: &'a str, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            cwd: None,
            timeout: None,
            mode: OutputMode::Captured,
        }
    }

    pub fn streamed(program: &'a str, args: Vec<String>) -> Self {
        Self {
            mode: OutputMode::Streamed,
            ..Self::captured(program, args)
        }
    }

    pub fn in_dir(mut self, cwd: &'a Path) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Render as a shell-like string for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion.
    ///
    /// A missing executable maps to `EngineError::NotInstalled`; a non-zero
    /// exit is returned in the output, not as an error. The child is killed
    /// if this future is dropped (timeout or operator interrupt).
    pub async fn run(&self) -> EngineResult<CommandOutput> {
        let start = Instant::now();
        debug!(command = %self.display(), "spawning");

        let mut command = Command::new(self.program);
        command.args(&self.args).kill_on_drop(true);
        if let Some(cwd) = self.cwd {
            command.current_dir(cwd);
        }
        match self.mode {
            OutputMode::Captured => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
            OutputMode::Streamed => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
        }

        let child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => EngineError::NotInstalled {
                program: self.program.to_string(),
            },
            _ => EngineError::Io(e),
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| EngineError::Timeout {
                    command: self.display(),
                    seconds: limit.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Run and require exit code 0, returning the captured output.
    pub async fn run_checked(&self) -> EngineResult<String> {
        let result = self.run().await?;
        if !result.success() {
            return Err(EngineError::CommandFailed {
                command: self.display(),
                exit_code: result.exit_code,
                output: result.output.trim().to_string(),
            });
        }
        Ok(result.output)
    }
}

/// Build an owned argument vector from string slices.
pub(crate) fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|s| s.as_ref().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captured_command() {
        let result = Invocation::captured("echo", args(["hello"]))
            .run()
            .await
            .expect("echo runs");
        assert!(result.success());
        assert!(result.output.contains("hello"));
    }

    #[tokio::test]
    async fn test_failing_command_is_not_an_error() {
        let result = Invocation::captured("false", vec![])
            .run()
            .await
            .expect("false runs");
        assert!(!result.success());
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_run_checked_reports_failure() {
        let err = Invocation::captured("false", vec![])
            .run_checked()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = Invocation::captured("dockpipe-definitely-missing-binary", vec![])
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotInstalled { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = Invocation::captured("sleep", args(["5"]))
            .with_timeout(Duration::from_millis(100))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
    }

    #[test]
    fn test_display() {
        let inv = Invocation::captured("docker", args(["image", "inspect", "demo"]));
        assert_eq!(inv.display(), "docker image inspect demo");
    }
}
