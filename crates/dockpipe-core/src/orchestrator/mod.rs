//! Compose stack lifecycle.
//!
//! `ServiceOrchestrator` drives the declared services through start, stop,
//! restart and rebuild, reports per-service health, runs the one-shot test
//! service and tears everything down. All engine access goes through
//! [`ComposeEngine`].

mod health;
mod probe;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dockpipe_engine::ComposeEngine;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::build::interrupt_signal;
use crate::config::StackConfig;
use crate::error::{PipelineError, Result};
use crate::host;

pub use health::{aggregate, classify, HealthState, OverallHealth, ServiceHealthSnapshot};
pub use probe::{probe_health, ProbeResult};

/// A declared service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default = "default_critical")]
    pub critical_for_health: bool,
}

fn default_critical() -> bool {
    true
}

impl ServiceSpec {
    pub fn critical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            critical_for_health: true,
        }
    }
}

/// Lifecycle state as seen by the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackState {
    Stopped,
    Starting,
    Running,
    Degraded,
    StoppedWithErrors,
}

/// Result of `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub services: Vec<ServiceHealthSnapshot>,
    pub overall: OverallHealth,
    pub state: StackState,
    pub endpoint: Option<ProbeResult>,
}

/// Result of `test`.
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub passed: bool,
    pub exit_code: i32,
    pub elapsed: Duration,
}

/// Result of `cleanup`. Each step is best-effort.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub stack_removed: bool,
    pub images_removed: usize,
    pub pruned: bool,
    pub failures: Vec<String>,
}

/// What `setup` did with the env file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvFileStatus {
    Present,
    CreatedFromTemplate,
    Missing,
}

pub struct ServiceOrchestrator {
    compose: Arc<dyn ComposeEngine>,
    project_dir: PathBuf,
    settings: StackConfig,
    settle: Duration,
    state: StackState,
}

impl ServiceOrchestrator {
    pub fn new(
        compose: Arc<dyn ComposeEngine>,
        project_dir: impl Into<PathBuf>,
        settings: StackConfig,
    ) -> Self {
        let settle = Duration::from_secs(settings.settle_secs);
        Self {
            compose,
            project_dir: project_dir.into(),
            settings,
            settle,
            state: StackState::Stopped,
        }
    }

    /// Override the pause between stop and start in `restart`.
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn state(&self) -> StackState {
        self.state
    }

    pub fn services(&self) -> &[ServiceSpec] {
        &self.settings.services
    }

    /// Configured ports already bound on the host. Reported, never resolved.
    pub async fn port_conflicts(&self) -> Vec<u16> {
        let taken = host::port_conflicts(&self.settings.ports).await;
        for port in &taken {
            warn!(port, "Port already in use (another process or a running stack)");
        }
        taken
    }

    /// Start the stack. Ctrl-C aborts with `Interrupted`.
    pub async fn start(&mut self) -> Result<StackState> {
        self.start_until(interrupt_signal()).await
    }

    pub async fn start_until<F>(&mut self, interrupt: F) -> Result<StackState>
    where
        F: Future<Output = ()>,
    {
        until_interrupted("start", self.bring_up(), interrupt).await
    }

    async fn bring_up(&mut self) -> Result<StackState> {
        self.port_conflicts().await;
        self.state = StackState::Starting;
        info!("Starting services");
        let output = match self.compose.up().await {
            Ok(out) => out,
            Err(e) => {
                self.state = StackState::Stopped;
                return Err(PipelineError::from_engine("start", e));
            }
        };
        if !output.success() {
            self.state = StackState::Stopped;
            return Err(PipelineError::execution(
                "start",
                format!("compose up exited with code {}: {}", output.exit_code, last_line(&output.output)),
                "inspect `dockpipe logs` and the compose file, then retry",
            ));
        }
        self.state = StackState::Running;
        info!("Services started");
        Ok(self.state)
    }

    /// Tear the stack down keeping volumes. Failures are reported, not raised.
    pub async fn stop(&mut self) -> StackState {
        info!("Stopping services");
        self.state = match self.compose.down(false).await {
            Ok(out) if out.success() => StackState::Stopped,
            Ok(out) => {
                warn!(exit_code = out.exit_code, "compose down reported errors");
                StackState::StoppedWithErrors
            }
            Err(e) => {
                warn!(error = %e, "compose down failed");
                StackState::StoppedWithErrors
            }
        };
        self.state
    }

    pub async fn restart(&mut self) -> Result<StackState> {
        self.restart_until(interrupt_signal()).await
    }

    pub async fn restart_until<F>(&mut self, interrupt: F) -> Result<StackState>
    where
        F: Future<Output = ()>,
    {
        until_interrupted("restart", self.cycle(), interrupt).await
    }

    async fn cycle(&mut self) -> Result<StackState> {
        self.stop().await;
        if !self.settle.is_zero() {
            info!(secs = self.settle.as_secs(), "Waiting before restart");
            tokio::time::sleep(self.settle).await;
        }
        self.bring_up().await
    }

    /// Rebuild images without the layer cache, then start.
    pub async fn build_and_start(&mut self) -> Result<StackState> {
        self.build_and_start_until(interrupt_signal()).await
    }

    pub async fn build_and_start_until<F>(&mut self, interrupt: F) -> Result<StackState>
    where
        F: Future<Output = ()>,
    {
        until_interrupted("build-and-start", self.rebuild(), interrupt).await
    }

    async fn rebuild(&mut self) -> Result<StackState> {
        info!("Building service images without cache");
        let output = self
            .compose
            .build(true)
            .await
            .map_err(|e| PipelineError::from_engine("compose build", e))?;
        if !output.success() {
            return Err(PipelineError::execution(
                "compose build",
                format!("exited with code {}", output.exit_code),
                "fix the build error above; `dockpipe build` gives a more detailed report",
            ));
        }
        self.bring_up().await
    }

    /// Copy the env template into place when the env file is missing.
    pub fn ensure_env_file(&self) -> Result<EnvFileStatus> {
        let env = self.project_dir.join(&self.settings.env_file);
        if env.is_file() {
            return Ok(EnvFileStatus::Present);
        }
        let template = self.project_dir.join(&self.settings.env_template);
        if !template.is_file() {
            warn!(env = %env.display(), "Env file missing and no template to copy");
            return Ok(EnvFileStatus::Missing);
        }
        std::fs::copy(&template, &env)?;
        warn!(
            env = %env.display(),
            template = %template.display(),
            "Created env file from template; review its values"
        );
        Ok(EnvFileStatus::CreatedFromTemplate)
    }

    /// First-time setup: env file, port report, rebuild and start.
    pub async fn setup(&mut self) -> Result<(EnvFileStatus, StackState)> {
        self.setup_until(interrupt_signal()).await
    }

    pub async fn setup_until<F>(&mut self, interrupt: F) -> Result<(EnvFileStatus, StackState)>
    where
        F: Future<Output = ()>,
    {
        let env = self.ensure_env_file()?;
        let state = until_interrupted("setup", self.rebuild(), interrupt).await?;
        Ok((env, state))
    }

    /// Query every declared service. Changes nothing.
    pub async fn status(&self) -> StatusReport {
        let mut services = Vec::with_capacity(self.settings.services.len());
        for spec in &self.settings.services {
            let snap = match self.compose.ps(&spec.name).await {
                Ok(containers) => ServiceHealthSnapshot::from_containers(&spec.name, &containers),
                Err(e) => ServiceHealthSnapshot::unavailable(&spec.name, e.to_string()),
            };
            services.push(snap);
        }

        let overall = aggregate(&self.settings.services, &services);
        let state = if overall == OverallHealth::Healthy {
            StackState::Running
        } else if services.iter().any(|s| s.running) {
            StackState::Degraded
        } else {
            StackState::Stopped
        };

        let endpoint = match &self.settings.health_url {
            Some(url) if state != StackState::Stopped => {
                Some(probe_health(url, Duration::from_secs(5)).await)
            }
            _ => None,
        };

        StatusReport {
            services,
            overall,
            state,
            endpoint,
        }
    }

    /// Follow logs until the stream ends or Ctrl-C.
    pub async fn logs(&self, service: Option<&str>) -> Result<()> {
        self.logs_until(service, interrupt_signal()).await
    }

    pub async fn logs_until<F>(&self, service: Option<&str>, interrupt: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = interrupt => {
                info!("Log stream interrupted");
                Ok(())
            }
            r = self.compose.logs(service) => {
                r.map(|_| ()).map_err(|e| PipelineError::from_engine("logs", e))
            }
        }
    }

    /// Run the one-shot test service. Requires the primary service running.
    pub async fn test(&self) -> Result<TestReport> {
        let primary = &self.settings.primary_service;
        let containers = self
            .compose
            .ps(primary)
            .await
            .map_err(|e| PipelineError::from_engine("test", e))?;
        if !containers.iter().any(|c| c.is_running()) {
            return Err(PipelineError::StackNotRunning {
                service: primary.clone(),
            });
        }

        let runner = &self.settings.test_runner_service;
        info!(service = %runner, "Running test suite");
        let started = Instant::now();
        let output = self
            .compose
            .run_oneshot(runner)
            .await
            .map_err(|e| PipelineError::from_engine("test", e))?;
        let report = TestReport {
            passed: output.success(),
            exit_code: output.exit_code,
            elapsed: started.elapsed(),
        };
        if report.passed {
            info!(elapsed_secs = report.elapsed.as_secs_f64(), "Tests passed");
        } else {
            warn!(exit_code = report.exit_code, "Tests failed");
        }
        Ok(report)
    }

    /// Remove the stack with its volumes, matching images and unreferenced
    /// engine resources.
    pub async fn cleanup(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        match self.compose.down(true).await {
            Ok(out) if out.success() => report.stack_removed = true,
            Ok(out) => report
                .failures
                .push(format!("compose down exited with code {}", out.exit_code)),
            Err(e) => report.failures.push(format!("compose down: {}", e)),
        }
        self.state = StackState::Stopped;

        match self.compose.remove_images(&self.settings.image_filter).await {
            Ok(n) => report.images_removed = n,
            Err(e) => report.failures.push(format!("remove images: {}", e)),
        }

        match self.compose.prune_system().await {
            Ok(out) if out.success() => report.pruned = true,
            Ok(out) => report
                .failures
                .push(format!("system prune exited with code {}", out.exit_code)),
            Err(e) => report.failures.push(format!("system prune: {}", e)),
        }

        for failure in &report.failures {
            warn!(%failure, "Cleanup step failed");
        }
        info!(
            images = report.images_removed,
            pruned = report.pruned,
            "Cleanup finished"
        );
        report
    }
}

/// Race a lifecycle action against an operator interrupt. The action is
/// dropped on interrupt, which kills any engine child it spawned.
async fn until_interrupted<T, A, F>(step: &str, action: A, interrupt: F) -> Result<T>
where
    A: Future<Output = Result<T>>,
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = interrupt => {
            warn!(step, "Interrupted");
            Err(PipelineError::Interrupted { step: step.to_string() })
        }
        r = action => r,
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(str::trim)
        .unwrap_or("no output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockpipe_engine::fakes::FakeComposeEngine;

    fn settings() -> StackConfig {
        StackConfig {
            ports: Vec::new(),
            health_url: None,
            settle_secs: 0,
            ..StackConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_failure_returns_to_stopped() {
        let compose = Arc::new(FakeComposeEngine::new().failing_up());
        let mut orch = ServiceOrchestrator::new(compose, ".", settings());
        let err = orch.start().await.unwrap_err();
        assert!(matches!(err, PipelineError::FatalExecution { .. }));
        assert_eq!(orch.state(), StackState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_failure_is_not_an_error() {
        let compose = Arc::new(FakeComposeEngine::new().failing_down());
        let mut orch = ServiceOrchestrator::new(compose, ".", settings());
        assert_eq!(orch.stop().await, StackState::StoppedWithErrors);
    }

    #[tokio::test]
    async fn test_status_with_broken_engine_reports_unknown() {
        let compose = Arc::new(FakeComposeEngine::new().broken_ps());
        let orch = ServiceOrchestrator::new(compose, ".", settings());
        let report = orch.status().await;
        assert_eq!(report.services.len(), 2);
        assert!(report.services.iter().all(|s| s.state == HealthState::Unknown));
        assert_eq!(report.state, StackState::Stopped);
    }

    #[test]
    fn test_last_line() {
        assert_eq!(last_line("a\nport is already allocated\n\n"), "port is already allocated");
        assert_eq!(last_line(""), "no output");
    }
}
