//! Adapter trait definitions
//!
//! These traits are the only way the orchestration layer reaches the outside
//! world:
//! - `BuildEngine`: image build and image housekeeping
//! - `ComposeEngine`: multi-service stack lifecycle
//! - `SyntaxChecker`: host interpreter used for source validation
//!
//! Conventions shared by all implementations:
//! - A missing executable is `EngineError::NotInstalled`.
//! - Action commands (build, up, down, run) return `CommandOutput` even when
//!   the exit code is non-zero; the caller decides whether that is fatal.
//! - Query commands (version, inspect, ps, df) return `CommandFailed` on a
//!   non-zero exit because their output is meaningless in that case.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::types::{CommandOutput, ImageMetadata, ImageSummary, ServerInfo, ServiceContainer};
use crate::EngineResult;

/// Image build engine (`docker build` and friends).
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Client version line. `NotInstalled` when the binary is absent.
    async fn client_version(&self) -> EngineResult<String>;

    /// Daemon identity. `DaemonUnreachable` when the client cannot reach it.
    async fn server_info(&self) -> EngineResult<ServerInfo>;

    /// Whether the BuildKit front-end (`buildx`) is available.
    async fn has_buildx(&self) -> bool;

    /// Run a build with the given arguments (everything after `build`).
    /// Output is streamed to the operator.
    async fn build(&self, args: &[String]) -> EngineResult<CommandOutput>;

    /// Inspect an image by tag or id. `None` when it does not exist.
    async fn inspect_image(&self, reference: &str) -> EngineResult<Option<ImageMetadata>>;

    /// Run `command` inside a throwaway container of `reference`, bounded by `timeout`.
    async fn run_smoke(
        &self,
        reference: &str,
        command: &[String],
        timeout: Duration,
    ) -> EngineResult<CommandOutput>;

    /// Images with no tag and no child referencing them.
    async fn dangling_images(&self) -> EngineResult<Vec<ImageSummary>>;

    /// Remove one image by id.
    async fn remove_image(&self, id: &str) -> EngineResult<()>;

    /// Bytes held by the build cache.
    async fn build_cache_bytes(&self) -> EngineResult<u64>;
}

/// Multi-service stack engine (`docker compose`).
#[async_trait]
pub trait ComposeEngine: Send + Sync {
    /// Bring every declared service up in the background.
    async fn up(&self) -> EngineResult<CommandOutput>;

    /// Tear the stack down, optionally removing named volumes.
    async fn down(&self, remove_volumes: bool) -> EngineResult<CommandOutput>;

    /// Build all service images. Output is streamed.
    async fn build(&self, no_cache: bool) -> EngineResult<CommandOutput>;

    /// Containers belonging to `service`.
    async fn ps(&self, service: &str) -> EngineResult<Vec<ServiceContainer>>;

    /// Follow logs for one service or, with `None`, all of them. Blocks until
    /// the stream ends.
    async fn logs(&self, service: Option<&str>) -> EngineResult<CommandOutput>;

    /// Run a one-shot service to completion and remove its container.
    async fn run_oneshot(&self, service: &str) -> EngineResult<CommandOutput>;

    /// Remove every image whose reference matches `name_filter`. Returns the
    /// number of images removed.
    async fn remove_images(&self, name_filter: &str) -> EngineResult<usize>;

    /// Prune unreferenced containers, networks, images and cache engine-wide.
    async fn prune_system(&self) -> EngineResult<CommandOutput>;
}

/// Source syntax validation through the host interpreter.
#[async_trait]
pub trait SyntaxChecker: Send + Sync {
    /// Interpreter version, e.g. `3.11.4`.
    async fn version(&self) -> EngineResult<String>;

    /// Parse one file. `Ok(None)` when it parses, `Ok(Some(diagnostic))`
    /// on a syntax error.
    async fn check_file(&self, path: &Path) -> EngineResult<Option<String>>;
}
