//! In-memory fakes for the adapter traits (testing only)
//!
//! Provides `FakeBuildEngine`, `FakeComposeEngine` and `FakeInterpreter`.
//! Each records every call so tests can assert on what the orchestration
//! layer asked for, and each can be configured into a failure mode with a
//! builder method.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::EngineError;
use crate::traits::{BuildEngine, ComposeEngine, SyntaxChecker};
use crate::types::{CommandOutput, ImageMetadata, ImageSummary, ServerInfo, ServiceContainer};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// FakeBuildEngine
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BuildState {
    installed: bool,
    daemon_up: bool,
    server: ServerInfo,
    buildx: bool,
    build_exit: i32,
    create_image: bool,
    image_size: u64,
    smoke_exit: i32,
    leave_dangling: usize,
    cache_bytes: u64,
    images: HashMap<String, ImageMetadata>,
    dangling: Vec<ImageSummary>,
    next_id: u64,
}

impl Default for BuildState {
    fn default() -> Self {
        Self {
            installed: true,
            daemon_up: true,
            server: ServerInfo {
                version: "24.0.7".to_string(),
                os: "linux".to_string(),
                arch: "amd64".to_string(),
            },
            buildx: true,
            build_exit: 0,
            create_image: true,
            image_size: 180_000_000,
            smoke_exit: 0,
            leave_dangling: 0,
            cache_bytes: 0,
            images: HashMap::new(),
            dangling: Vec::new(),
            next_id: 1,
        }
    }
}

/// Build engine that never leaves the process.
#[derive(Debug, Default)]
pub struct FakeBuildEngine {
    state: Mutex<BuildState>,
    calls: Mutex<Vec<String>>,
    builds: Mutex<Vec<Vec<String>>>,
}

impl FakeBuildEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn configure(mut self, f: impl FnOnce(&mut BuildState)) -> Self {
        f(self.state.get_mut().unwrap());
        self
    }

    /// The client binary is missing.
    pub fn not_installed(self) -> Self {
        self.configure(|s| s.installed = false)
    }

    /// The client works but the daemon does not answer.
    pub fn daemon_down(self) -> Self {
        self.configure(|s| s.daemon_up = false)
    }

    pub fn with_server_version(self, version: &str) -> Self {
        let version = version.to_string();
        self.configure(|s| s.server.version = version)
    }

    pub fn with_server_arch(self, arch: &str) -> Self {
        let arch = arch.to_string();
        self.configure(|s| s.server.arch = arch)
    }

    pub fn without_buildx(self) -> Self {
        self.configure(|s| s.buildx = false)
    }

    /// `build` exits with `code`.
    pub fn failing_build(self, code: i32) -> Self {
        self.configure(|s| s.build_exit = code)
    }

    /// `build` exits 0 but no image appears under the tag.
    pub fn without_image_output(self) -> Self {
        self.configure(|s| s.create_image = false)
    }

    pub fn failing_smoke(self) -> Self {
        self.configure(|s| s.smoke_exit = 1)
    }

    /// Each build leaves `count` untagged intermediate images behind.
    pub fn leaving_dangling(self, count: usize) -> Self {
        self.configure(|s| s.leave_dangling = count)
    }

    /// Pre-existing dangling image, older than any build in the test.
    pub fn with_dangling(self, image: ImageSummary) -> Self {
        self.configure(|s| s.dangling.push(image))
    }

    pub fn with_cache_bytes(self, bytes: u64) -> Self {
        self.configure(|s| s.cache_bytes = bytes)
    }

    /// Names of every trait method called, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// How many times `method` was called.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == method).count()
    }

    /// Argument vectors passed to `build`.
    pub fn build_invocations(&self) -> Vec<Vec<String>> {
        self.builds.lock().unwrap().clone()
    }

    /// Dangling images still present.
    pub fn remaining_dangling(&self) -> usize {
        self.state.lock().unwrap().dangling.len()
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }

    fn ensure_daemon(&self) -> EngineResult<()> {
        let state = self.state.lock().unwrap();
        if !state.installed {
            return Err(EngineError::NotInstalled {
                program: "docker".to_string(),
            });
        }
        if !state.daemon_up {
            return Err(EngineError::DaemonUnreachable(
                "Cannot connect to the Docker daemon".to_string(),
            ));
        }
        Ok(())
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn fake_id(n: u64) -> String {
    format!("sha256:{:064x}", n)
}

#[async_trait]
impl BuildEngine for FakeBuildEngine {
    async fn client_version(&self) -> EngineResult<String> {
        self.record("client_version");
        let state = self.state.lock().unwrap();
        if !state.installed {
            return Err(EngineError::NotInstalled {
                program: "docker".to_string(),
            });
        }
        Ok(format!("Docker version {}, build fake", state.server.version))
    }

    async fn server_info(&self) -> EngineResult<ServerInfo> {
        self.record("server_info");
        self.ensure_daemon()?;
        Ok(self.state.lock().unwrap().server.clone())
    }

    async fn has_buildx(&self) -> bool {
        self.record("has_buildx");
        let state = self.state.lock().unwrap();
        state.installed && state.buildx
    }

    async fn build(&self, args: &[String]) -> EngineResult<CommandOutput> {
        self.record("build");
        self.builds.lock().unwrap().push(args.to_vec());
        self.ensure_daemon()?;

        let mut state = self.state.lock().unwrap();
        if state.build_exit != 0 {
            return Ok(CommandOutput::failed(state.build_exit, "build failed"));
        }

        let now = Utc::now();
        for _ in 0..state.leave_dangling {
            let id = fake_id(state.next_id);
            state.next_id += 1;
            state.dangling.push(ImageSummary { id, created_at: now });
        }

        if state.create_image {
            let id = fake_id(state.next_id);
            state.next_id += 1;
            if let Some(path) = flag_value(args, "--iidfile") {
                std::fs::write(path, &id)?;
            }
            if let Some(tag) = flag_value(args, "-t") {
                let meta = ImageMetadata {
                    id,
                    size_bytes: state.image_size,
                    created_at: now,
                    tags: vec![tag.to_string()],
                };
                state.images.insert(tag.to_string(), meta);
            }
        }
        Ok(CommandOutput::ok())
    }

    async fn inspect_image(&self, reference: &str) -> EngineResult<Option<ImageMetadata>> {
        self.record("inspect_image");
        self.ensure_daemon()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .images
            .get(reference)
            .or_else(|| state.images.values().find(|m| m.id == reference))
            .cloned())
    }

    async fn run_smoke(
        &self,
        _reference: &str,
        _command: &[String],
        _timeout: Duration,
    ) -> EngineResult<CommandOutput> {
        self.record("run_smoke");
        let state = self.state.lock().unwrap();
        if state.smoke_exit == 0 {
            Ok(CommandOutput {
                exit_code: 0,
                output: "Python 3.11.9\n".to_string(),
                duration_ms: 5,
            })
        } else {
            Ok(CommandOutput::failed(state.smoke_exit, "exec format error"))
        }
    }

    async fn dangling_images(&self) -> EngineResult<Vec<ImageSummary>> {
        self.record("dangling_images");
        self.ensure_daemon()?;
        Ok(self.state.lock().unwrap().dangling.clone())
    }

    async fn remove_image(&self, id: &str) -> EngineResult<()> {
        self.record("remove_image");
        let mut state = self.state.lock().unwrap();
        let before = state.dangling.len();
        state.dangling.retain(|img| img.id != id);
        if state.dangling.len() == before {
            return Err(EngineError::CommandFailed {
                command: format!("docker rmi {}", id),
                exit_code: 1,
                output: "No such image".to_string(),
            });
        }
        Ok(())
    }

    async fn build_cache_bytes(&self) -> EngineResult<u64> {
        self.record("build_cache_bytes");
        self.ensure_daemon()?;
        Ok(self.state.lock().unwrap().cache_bytes)
    }
}

// ---------------------------------------------------------------------------
// FakeComposeEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ComposeState {
    containers: Vec<ServiceContainer>,
    up_exit: i32,
    down_exit: i32,
    build_exit: i32,
    oneshot_exit: i32,
    ps_broken: bool,
    images: usize,
    rmi_broken: bool,
}

/// Compose engine with a scripted set of containers.
#[derive(Debug, Default)]
pub struct FakeComposeEngine {
    state: Mutex<ComposeState>,
    calls: Mutex<Vec<String>>,
}

impl FakeComposeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn configure(mut self, f: impl FnOnce(&mut ComposeState)) -> Self {
        f(self.state.get_mut().unwrap());
        self
    }

    /// Add a container for `service` with the given `State` and `Health`.
    pub fn with_container(self, service: &str, state: &str, health: &str) -> Self {
        let container = ServiceContainer {
            name: format!("stack-{}-1", service),
            service: service.to_string(),
            state: state.to_string(),
            health: health.to_string(),
            status: format!("{} ({})", state, health),
        };
        self.configure(|s| s.containers.push(container))
    }

    pub fn failing_up(self) -> Self {
        self.configure(|s| s.up_exit = 1)
    }

    pub fn failing_down(self) -> Self {
        self.configure(|s| s.down_exit = 1)
    }

    pub fn failing_build(self) -> Self {
        self.configure(|s| s.build_exit = 1)
    }

    /// `ps` errors as if the daemon went away.
    pub fn broken_ps(self) -> Self {
        self.configure(|s| s.ps_broken = true)
    }

    pub fn with_oneshot_exit(self, code: i32) -> Self {
        self.configure(|s| s.oneshot_exit = code)
    }

    /// Number of images matching any filter.
    pub fn with_images(self, count: usize) -> Self {
        self.configure(|s| s.images = count)
    }

    /// `remove_images` fails and leaves every image in place.
    pub fn failing_image_removal(self) -> Self {
        self.configure(|s| s.rmi_broken = true)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(method))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn exit(code: i32) -> CommandOutput {
        if code == 0 {
            CommandOutput::ok()
        } else {
            CommandOutput::failed(code, "compose failed")
        }
    }
}

#[async_trait]
impl ComposeEngine for FakeComposeEngine {
    async fn up(&self) -> EngineResult<CommandOutput> {
        self.record("up".to_string());
        Ok(Self::exit(self.state.lock().unwrap().up_exit))
    }

    async fn down(&self, remove_volumes: bool) -> EngineResult<CommandOutput> {
        self.record(format!("down volumes={}", remove_volumes));
        Ok(Self::exit(self.state.lock().unwrap().down_exit))
    }

    async fn build(&self, no_cache: bool) -> EngineResult<CommandOutput> {
        self.record(format!("build no_cache={}", no_cache));
        Ok(Self::exit(self.state.lock().unwrap().build_exit))
    }

    async fn ps(&self, service: &str) -> EngineResult<Vec<ServiceContainer>> {
        self.record(format!("ps {}", service));
        let state = self.state.lock().unwrap();
        if state.ps_broken {
            return Err(EngineError::DaemonUnreachable("connection refused".into()));
        }
        Ok(state
            .containers
            .iter()
            .filter(|c| c.service == service)
            .cloned()
            .collect())
    }

    async fn logs(&self, service: Option<&str>) -> EngineResult<CommandOutput> {
        self.record(format!("logs {}", service.unwrap_or("*")));
        Ok(CommandOutput::ok())
    }

    async fn run_oneshot(&self, service: &str) -> EngineResult<CommandOutput> {
        self.record(format!("run_oneshot {}", service));
        Ok(Self::exit(self.state.lock().unwrap().oneshot_exit))
    }

    async fn remove_images(&self, name_filter: &str) -> EngineResult<usize> {
        self.record(format!("remove_images {}", name_filter));
        let mut state = self.state.lock().unwrap();
        if state.rmi_broken {
            return Err(EngineError::CommandFailed {
                command: format!("docker rmi --force <{}>", name_filter),
                exit_code: 1,
                output: "image is being used by running container".to_string(),
            });
        }
        let removed = state.images;
        state.images = 0;
        Ok(removed)
    }

    async fn prune_system(&self) -> EngineResult<CommandOutput> {
        self.record("prune_system".to_string());
        Ok(CommandOutput::ok())
    }
}

// ---------------------------------------------------------------------------
// FakeInterpreter
// ---------------------------------------------------------------------------

/// Interpreter that flags configured file names as syntax errors.
#[derive(Debug)]
pub struct FakeInterpreter {
    version: Option<String>,
    broken: HashSet<String>,
    checked: Mutex<Vec<PathBuf>>,
}

impl Default for FakeInterpreter {
    fn default() -> Self {
        Self {
            version: Some("3.11.4".to_string()),
            broken: HashSet::new(),
            checked: Mutex::new(Vec::new()),
        }
    }
}

impl FakeInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Interpreter binary missing.
    pub fn missing(mut self) -> Self {
        self.version = None;
        self
    }

    /// Any file with this file name fails to parse.
    pub fn with_syntax_error(mut self, file_name: &str) -> Self {
        self.broken.insert(file_name.to_string());
        self
    }

    /// Paths passed to `check_file`, in order.
    pub fn checked_files(&self) -> Vec<PathBuf> {
        self.checked.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyntaxChecker for FakeInterpreter {
    async fn version(&self) -> EngineResult<String> {
        self.version.clone().ok_or_else(|| EngineError::NotInstalled {
            program: "python3".to_string(),
        })
    }

    async fn check_file(&self, path: &Path) -> EngineResult<Option<String>> {
        if self.version.is_none() {
            return Err(EngineError::NotInstalled {
                program: "python3".to_string(),
            });
        }
        self.checked.lock().unwrap().push(path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.broken.contains(&name) {
            return Ok(Some(format!("SyntaxError: invalid syntax ({})", name)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fake_build_creates_tagged_image_and_iidfile() {
        let dir = tempdir().unwrap();
        let iid = dir.path().join("iid");
        let engine = FakeBuildEngine::new();
        let args = vec![
            "-t".to_string(),
            "demo".to_string(),
            "--iidfile".to_string(),
            iid.to_string_lossy().to_string(),
            ".".to_string(),
        ];

        let out = engine.build(&args).await.unwrap();
        assert!(out.success());
        let meta = engine.inspect_image("demo").await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&iid).unwrap(), meta.id);
        assert_eq!(engine.call_count("build"), 1);
    }

    #[tokio::test]
    async fn test_fake_build_failure_leaves_no_image() {
        let engine = FakeBuildEngine::new().failing_build(2);
        let out = engine.build(&["-t".into(), "demo".into()]).await.unwrap();
        assert_eq!(out.exit_code, 2);
        assert!(engine.inspect_image("demo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fake_daemon_down() {
        let engine = FakeBuildEngine::new().daemon_down();
        assert!(engine.client_version().await.is_ok());
        let err = engine.server_info().await.unwrap_err();
        assert!(matches!(err, EngineError::DaemonUnreachable(_)));
    }

    #[tokio::test]
    async fn test_fake_remove_image_twice_errors() {
        let engine = FakeBuildEngine::new().leaving_dangling(1);
        engine.build(&[]).await.unwrap();
        let dangling = engine.dangling_images().await.unwrap();
        assert_eq!(dangling.len(), 1);
        engine.remove_image(&dangling[0].id).await.unwrap();
        assert!(engine.remove_image(&dangling[0].id).await.is_err());
        assert_eq!(engine.remaining_dangling(), 0);
    }

    #[tokio::test]
    async fn test_fake_compose_ps_filters_by_service() {
        let compose = FakeComposeEngine::new()
            .with_container("app", "running", "healthy")
            .with_container("postgres", "running", "starting");
        let app = compose.ps("app").await.unwrap();
        assert_eq!(app.len(), 1);
        assert_eq!(app[0].health, "healthy");
        assert_eq!(compose.call_count("ps"), 1);
    }

    #[tokio::test]
    async fn test_fake_interpreter_flags_configured_file() {
        let py = FakeInterpreter::new().with_syntax_error("broken.py");
        assert!(py.check_file(Path::new("a/ok.py")).await.unwrap().is_none());
        assert!(py.check_file(Path::new("a/broken.py")).await.unwrap().is_some());
        assert_eq!(py.checked_files().len(), 2);
    }
}
