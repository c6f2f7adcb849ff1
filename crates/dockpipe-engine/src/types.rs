//! Typed results returned by the engine adapters.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::EngineError;
use crate::EngineResult;

/// Result of one external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (-1 when the process was killed by a signal).
    pub exit_code: i32,

    /// Combined stdout + stderr. Empty for streamed commands, whose
    /// output goes straight to the operator's terminal.
    pub output: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Successful output with no captured text (used by fakes and streamed calls).
    pub fn ok() -> Self {
        Self {
            exit_code: 0,
            output: String::new(),
            duration_ms: 0,
        }
    }

    /// Failed output with the given code and message.
    pub fn failed(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            duration_ms: 0,
        }
    }
}

/// Daemon identity as reported by `docker version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Os", default)]
    pub os: String,
    #[serde(rename = "Arch", default)]
    pub arch: String,
}

/// Metadata of a built image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Size")]
    pub size_bytes: u64,
    #[serde(rename = "Created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "RepoTags", default)]
    pub tags: Vec<String>,
}

impl ImageMetadata {
    /// Short id without the `sha256:` prefix (12 chars).
    pub fn short_id(&self) -> &str {
        let id = self.id.strip_prefix("sha256:").unwrap_or(&self.id);
        &id[..12.min(id.len())]
    }
}

/// An image known to the engine, as listed for pruning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// One container of a compose service, as reported by `docker compose ps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContainer {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Service")]
    pub service: String,
    /// `running`, `exited`, `restarting`, ...
    #[serde(rename = "State", default)]
    pub state: String,
    /// `healthy`, `unhealthy`, `starting`, or empty without a healthcheck.
    #[serde(rename = "Health", default)]
    pub health: String,
    /// Human status line, e.g. `Up 3 minutes (healthy)`.
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl ServiceContainer {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Parse `docker compose ps --format json` output.
///
/// Older compose releases print a single JSON array, newer ones print one
/// object per line; both are accepted.
pub fn parse_ps_output(raw: &str) -> EngineResult<Vec<ServiceContainer>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(EngineError::from))
        .collect()
}

/// Parse `docker image inspect` output (a JSON array) into the first entry.
pub fn parse_inspect_output(raw: &str) -> EngineResult<Option<ImageMetadata>> {
    let mut images: Vec<ImageMetadata> = serde_json::from_str(raw.trim())?;
    if images.is_empty() {
        return Ok(None);
    }
    Ok(Some(images.swap_remove(0)))
}

#[derive(Deserialize)]
struct DiskUsageLine {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Size")]
    size: String,
}

/// Extract the build-cache size from `docker system df --format '{{json .}}'`.
pub fn parse_build_cache_size(raw: &str) -> EngineResult<u64> {
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let usage: DiskUsageLine = serde_json::from_str(line)?;
        if usage.kind == "Build Cache" {
            return parse_human_size(&usage.size)
                .ok_or_else(|| EngineError::Parse(format!("bad size: {}", usage.size)));
        }
    }
    Ok(0)
}

fn size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([kKMGTP]?i?B)\s*$").expect("valid size regex")
    })
}

/// Parse a docker human-readable size (`1.2GB`, `512kB`, `3MiB`) into bytes.
///
/// Docker prints decimal units; the binary `*iB` forms are accepted too.
pub fn parse_human_size(text: &str) -> Option<u64> {
    let caps = size_pattern().captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = &caps[2];
    let multiplier: f64 = match unit.to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "PB" => 1e15,
        "KIB" => 1024.0,
        "MIB" => 1024.0 * 1024.0,
        "GIB" => 1024.0 * 1024.0 * 1024.0,
        "TIB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_ndjson() {
        let raw = r#"{"Name":"app-1","Service":"app","State":"running","Health":"healthy","Status":"Up 2 minutes (healthy)"}
{"Name":"db-1","Service":"postgres","State":"running","Health":"starting","Status":"Up 5 seconds (health: starting)"}"#;
        let containers = parse_ps_output(raw).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].service, "app");
        assert!(containers[0].is_running());
        assert_eq!(containers[1].health, "starting");
    }

    #[test]
    fn test_parse_ps_array_without_health() {
        let raw = r#"[{"Name":"app-1","Service":"app","State":"exited","Status":"Exited (1)"}]"#;
        let containers = parse_ps_output(raw).unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].health, "");
        assert!(!containers[0].is_running());
    }

    #[test]
    fn test_parse_ps_empty() {
        assert!(parse_ps_output("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_inspect() {
        let raw = r#"[{"Id":"sha256:0123456789abcdef0123","Size":123456789,"Created":"2024-03-01T10:15:30.123456789Z","RepoTags":["demo:latest"]}]"#;
        let meta = parse_inspect_output(raw).unwrap().unwrap();
        assert_eq!(meta.size_bytes, 123_456_789);
        assert_eq!(meta.short_id(), "0123456789ab");
        assert_eq!(meta.tags, vec!["demo:latest".to_string()]);
    }

    #[test]
    fn test_human_sizes() {
        assert_eq!(parse_human_size("0B"), Some(0));
        assert_eq!(parse_human_size("512kB"), Some(512_000));
        assert_eq!(parse_human_size("1.5GB"), Some(1_500_000_000));
        assert_eq!(parse_human_size("2MiB"), Some(2 * 1024 * 1024));
        assert_eq!(parse_human_size("lots"), None);
    }

    #[test]
    fn test_build_cache_size_from_system_df() {
        let raw = r#"{"Active":"2","Reclaimable":"0B","Size":"1.2GB","TotalCount":"3","Type":"Images"}
{"Active":"0","Reclaimable":"2.5GB","Size":"2.5GB","TotalCount":"40","Type":"Build Cache"}"#;
        assert_eq!(parse_build_cache_size(raw).unwrap(), 2_500_000_000);
        assert_eq!(parse_build_cache_size("").unwrap(), 0);
    }
}
