//! `docker` CLI backend for [`BuildEngine`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::process::{args, Invocation};
use crate::traits::BuildEngine;
use crate::types::{
    parse_build_cache_size, parse_inspect_output, CommandOutput, ImageMetadata, ImageSummary,
    ServerInfo,
};
use crate::EngineResult;

/// Build engine backed by the `docker` executable.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    workdir: Option<PathBuf>,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            workdir: None,
        }
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different client binary (e.g. `podman`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Run builds from this directory so relative contexts resolve against it.
    pub fn in_dir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn captured(&self, argv: Vec<String>) -> Invocation<'_> {
        let inv = Invocation::captured(&self.binary, argv);
        match &self.workdir {
            Some(dir) => inv.in_dir(dir),
            None => inv,
        }
    }
}

#[async_trait]
impl BuildEngine for DockerCli {
    async fn client_version(&self) -> EngineResult<String> {
        let out = self.captured(args(["--version"])).run_checked().await?;
        Ok(out.trim().to_string())
    }

    async fn server_info(&self) -> EngineResult<ServerInfo> {
        let result = self
            .captured(args(["version", "--format", "{{json .Server}}"]))
            .with_timeout(Duration::from_secs(15))
            .run()
            .await?;
        let text = result.output.trim();
        if !result.success() || text.is_empty() || text == "null" {
            return Err(EngineError::DaemonUnreachable(text.to_string()));
        }
        // stderr may trail the JSON object when the client warns about config
        let json = text.lines().next().unwrap_or_default();
        Ok(serde_json::from_str(json)?)
    }

    async fn has_buildx(&self) -> bool {
        match self.captured(args(["buildx", "version"])).run().await {
            Ok(out) => out.success(),
            Err(e) => {
                debug!(error = %e, "buildx probe failed");
                false
            }
        }
    }

    async fn build(&self, build_args: &[String]) -> EngineResult<CommandOutput> {
        let mut argv = vec!["build".to_string()];
        argv.extend_from_slice(build_args);
        let inv = Invocation::streamed(&self.binary, argv);
        let inv = match &self.workdir {
            Some(dir) => inv.in_dir(dir),
            None => inv,
        };
        inv.run().await
    }

    async fn inspect_image(&self, reference: &str) -> EngineResult<Option<ImageMetadata>> {
        let result = self
            .captured(args(["image", "inspect", reference]))
            .run()
            .await?;
        if !result.success() {
            debug!(reference, "image not found");
            return Ok(None);
        }
        parse_inspect_output(&result.output)
    }

    async fn run_smoke(
        &self,
        reference: &str,
        command: &[String],
        timeout: Duration,
    ) -> EngineResult<CommandOutput> {
        let name = format!("dockpipe-smoke-{}", Uuid::new_v4().simple());
        let mut argv = args(["run", "--rm", "--name", name.as_str(), "--entrypoint", ""]);
        argv.push(reference.to_string());
        argv.extend_from_slice(command);

        match self.captured(argv).with_timeout(timeout).run().await {
            Err(err @ EngineError::Timeout { .. }) => {
                // Killing the client leaves the container running; `--rm`
                // only fires once it exits.
                let removal = self
                    .captured(args(["rm", "--force", name.as_str()]))
                    .with_timeout(Duration::from_secs(15))
                    .run_checked()
                    .await;
                if let Err(e) = removal {
                    warn!(container = %name, error = %e, "could not remove timed-out smoke container");
                }
                Err(err)
            }
            other => other,
        }
    }

    async fn dangling_images(&self) -> EngineResult<Vec<ImageSummary>> {
        let out = self
            .captured(args([
                "images",
                "--quiet",
                "--no-trunc",
                "--filter",
                "dangling=true",
            ]))
            .run_checked()
            .await?;

        let mut images = Vec::new();
        for id in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match self.inspect_image(id).await {
                Ok(Some(meta)) => images.push(ImageSummary {
                    id: meta.id,
                    created_at: meta.created_at,
                }),
                Ok(None) => {}
                Err(e) => warn!(image = id, error = %e, "could not inspect dangling image"),
            }
        }
        Ok(images)
    }

    async fn remove_image(&self, id: &str) -> EngineResult<()> {
        self.captured(args(["rmi", id])).run_checked().await?;
        Ok(())
    }

    async fn build_cache_bytes(&self) -> EngineResult<u64> {
        let out = self
            .captured(args(["system", "df", "--format", "{{json .}}"]))
            .run_checked()
            .await?;
        parse_build_cache_size(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_cli_defaults() {
        let cli = DockerCli::new();
        assert_eq!(cli.binary(), "docker");
        assert!(cli.workdir.is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_installed() {
        let cli = DockerCli::new().with_binary("dockpipe-no-such-docker");
        let err = cli.client_version().await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(!cli.has_buildx().await);
    }
}
