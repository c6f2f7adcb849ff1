//! Cleanup registry owned by a single build invocation.
//!
//! Resources are registered as soon as they exist. `drain` releases them
//! once, best-effort: every failure becomes a warning in the returned
//! report and never replaces the build's own error.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dockpipe_engine::BuildEngine;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::host::format_bytes;

/// What a drain released.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed_files: usize,
    pub removed_images: usize,
    pub failures: Vec<String>,
    /// Build cache size when it exceeded the warning threshold.
    pub cache_over_threshold: Option<u64>,
    /// Entries still registered after the drain. Always 0.
    pub residual_entries: usize,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct CleanupRegistry {
    temp_files: BTreeSet<PathBuf>,
    intermediate_images: BTreeSet<String>,
    started_at: DateTime<Utc>,
    stage: &'static str,
    drained: bool,
}

impl CleanupRegistry {
    /// Images the engine reports as created at or after `started_at` are
    /// attributed to this build.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            temp_files: BTreeSet::new(),
            intermediate_images: BTreeSet::new(),
            started_at,
            stage: "pre-flight",
            drained: false,
        }
    }

    pub fn register_temp_file(&mut self, path: impl Into<PathBuf>) {
        self.temp_files.insert(path.into());
    }

    /// Record the stage currently executing, reported on interrupt.
    pub fn enter(&mut self, stage: &'static str) {
        debug!(stage, "Entering build stage");
        self.stage = stage;
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn len(&self) -> usize {
        self.temp_files.len() + self.intermediate_images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release everything. A second call returns an empty report without
    /// touching the engine.
    pub async fn drain(&mut self, engine: &dyn BuildEngine, cache_warn_bytes: u64) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.drained {
            return report;
        }
        self.drained = true;

        for path in std::mem::take(&mut self.temp_files) {
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed_files += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not remove temp file");
                    report.failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        match engine.dangling_images().await {
            Ok(images) => {
                for img in images.into_iter().filter(|i| i.created_at >= self.started_at) {
                    self.intermediate_images.insert(img.id);
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not list dangling images");
                report.failures.push(format!("list dangling images: {}", e));
            }
        }

        for id in std::mem::take(&mut self.intermediate_images) {
            match engine.remove_image(&id).await {
                Ok(()) => report.removed_images += 1,
                Err(e) => {
                    warn!(image = %id, error = %e, "Could not remove intermediate image");
                    report.failures.push(format!("{}: {}", id, e));
                }
            }
        }

        match engine.build_cache_bytes().await {
            Ok(bytes) if bytes > cache_warn_bytes => {
                warn!(
                    cache = %format_bytes(bytes),
                    "Build cache is large; reclaim it with `docker builder prune`"
                );
                report.cache_over_threshold = Some(bytes);
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Build cache size unavailable"),
        }

        report.residual_entries = self.len();
        info!(
            files = report.removed_files,
            images = report.removed_images,
            failures = report.failures.len(),
            "Cleanup finished"
        );
        report
    }
}

impl Drop for CleanupRegistry {
    fn drop(&mut self) {
        // Reached without a drain only when the async path never completed.
        for path in std::mem::take(&mut self.temp_files) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Could not remove temp file on drop");
                }
            }
        }
    }
}
