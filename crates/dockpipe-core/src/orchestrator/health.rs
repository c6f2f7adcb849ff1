//! Per-service health classification and aggregation.

use dockpipe_engine::ServiceContainer;
use serde::{Deserialize, Serialize};

use super::ServiceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Starting,
    Unhealthy,
    Unknown,
}

impl HealthState {
    pub fn symbol(&self) -> &'static str {
        match self {
            HealthState::Healthy => "✓",
            HealthState::Starting => "…",
            HealthState::Unhealthy => "✗",
            HealthState::Unknown => "?",
        }
    }
}

/// Classify an engine health string. `unhealthy` is tested before
/// `healthy` because it contains it.
pub fn classify(text: &str) -> HealthState {
    if text.contains("unhealthy") {
        HealthState::Unhealthy
    } else if text.contains("healthy") {
        HealthState::Healthy
    } else if text.contains("starting") {
        HealthState::Starting
    } else {
        HealthState::Unknown
    }
}

/// One poll of one service. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealthSnapshot {
    pub service: String,
    pub state: HealthState,
    pub running: bool,
    pub status_text: String,
}

impl ServiceHealthSnapshot {
    /// Snapshot from the containers `ps` returned for `service`. The health
    /// field wins; without one the human status (`Up 2 minutes (healthy)`)
    /// is classified instead.
    pub fn from_containers(service: &str, containers: &[ServiceContainer]) -> Self {
        let Some(c) = containers.first() else {
            return Self {
                service: service.to_string(),
                state: HealthState::Unknown,
                running: false,
                status_text: "not created".to_string(),
            };
        };
        let source = if c.health.is_empty() { &c.status } else { &c.health };
        Self {
            service: service.to_string(),
            state: classify(source),
            running: containers.iter().any(ServiceContainer::is_running),
            status_text: if c.status.is_empty() {
                c.state.clone()
            } else {
                c.status.clone()
            },
        }
    }

    /// Snapshot for a service whose state could not be queried.
    pub fn unavailable(service: &str, reason: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            state: HealthState::Unknown,
            running: false,
            status_text: reason.into(),
        }
    }
}

/// Aggregate over the critical services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    /// Some critical service is not yet healthy; poll again.
    NotReady,
}

pub fn aggregate(specs: &[ServiceSpec], snapshots: &[ServiceHealthSnapshot]) -> OverallHealth {
    let all_healthy = specs.iter().filter(|s| s.critical_for_health).all(|spec| {
        snapshots
            .iter()
            .any(|snap| snap.service == spec.name && snap.state == HealthState::Healthy)
    });
    if all_healthy {
        OverallHealth::Healthy
    } else {
        OverallHealth::NotReady
    }
}
