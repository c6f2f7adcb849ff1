//! `docker compose` backend for [`ComposeEngine`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::process::{args, Invocation};
use crate::traits::ComposeEngine;
use crate::types::{parse_ps_output, CommandOutput, ServiceContainer};
use crate::EngineResult;

/// Compose engine bound to one compose file and env file.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    binary: String,
    project_dir: PathBuf,
    compose_file: PathBuf,
    env_file: Option<PathBuf>,
}

impl DockerCompose {
    /// Paths are resolved relative to `project_dir`.
    pub fn new(project_dir: impl Into<PathBuf>, compose_file: impl Into<PathBuf>) -> Self {
        Self {
            binary: "docker".to_string(),
            project_dir: project_dir.into(),
            compose_file: compose_file.into(),
            env_file: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_env_file(mut self, env_file: impl Into<PathBuf>) -> Self {
        self.env_file = Some(env_file.into());
        self
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    /// `compose -f <file> [--env-file <env>] <rest...>`
    fn compose_args<I, S>(&self, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut argv = args(["compose", "-f"]);
        argv.push(self.compose_file.to_string_lossy().to_string());
        if let Some(env) = &self.env_file {
            if self.project_dir.join(env).exists() {
                argv.push("--env-file".to_string());
                argv.push(env.to_string_lossy().to_string());
            } else {
                debug!(env_file = %env.display(), "env file missing, compose uses defaults");
            }
        }
        argv.extend(args(rest));
        argv
    }

    fn captured(&self, argv: Vec<String>) -> Invocation<'_> {
        Invocation::captured(&self.binary, argv).in_dir(&self.project_dir)
    }

    fn streamed(&self, argv: Vec<String>) -> Invocation<'_> {
        Invocation::streamed(&self.binary, argv).in_dir(&self.project_dir)
    }
}

#[async_trait]
impl ComposeEngine for DockerCompose {
    async fn up(&self) -> EngineResult<CommandOutput> {
        self.captured(self.compose_args(["up", "-d"])).run().await
    }

    async fn down(&self, remove_volumes: bool) -> EngineResult<CommandOutput> {
        let mut rest = vec!["down", "--remove-orphans"];
        if remove_volumes {
            rest.push("--volumes");
        }
        self.captured(self.compose_args(rest)).run().await
    }

    async fn build(&self, no_cache: bool) -> EngineResult<CommandOutput> {
        let mut rest = vec!["build"];
        if no_cache {
            rest.push("--no-cache");
        }
        self.streamed(self.compose_args(rest)).run().await
    }

    async fn ps(&self, service: &str) -> EngineResult<Vec<ServiceContainer>> {
        let out = self
            .captured(self.compose_args(["ps", "--all", "--format", "json", service]))
            .run_checked()
            .await?;
        parse_ps_output(&out)
    }

    async fn logs(&self, service: Option<&str>) -> EngineResult<CommandOutput> {
        let mut rest = vec!["logs", "--follow", "--tail", "100"];
        if let Some(name) = service {
            rest.push(name);
        }
        self.streamed(self.compose_args(rest)).run().await
    }

    async fn run_oneshot(&self, service: &str) -> EngineResult<CommandOutput> {
        self.streamed(self.compose_args(["run", "--rm", service]))
            .run()
            .await
    }

    async fn remove_images(&self, name_filter: &str) -> EngineResult<usize> {
        let reference = format!("reference={}", name_filter);
        let out = self
            .captured(args(["images", "--quiet", "--filter", reference.as_str()]))
            .run_checked()
            .await?;

        let mut ids: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut argv = args(["rmi", "--force"]);
        argv.extend(ids.iter().cloned());
        let inv = self.captured(argv);
        let result = inv.run().await?;
        if !result.success() {
            warn!(output = %result.output.trim(), "some images could not be removed");
            return Err(EngineError::CommandFailed {
                command: inv.display(),
                exit_code: result.exit_code,
                output: result.output.trim().to_string(),
            });
        }
        Ok(ids.len())
    }

    async fn prune_system(&self) -> EngineResult<CommandOutput> {
        self.captured(args(["system", "prune", "--force"])).run().await
    }
}
