//! Engine and host environment checks.

use dockpipe_engine::ServerInfo;

use super::report::{CheckResult, ValidationReport};
use super::{parse_major_minor, Scope};
use crate::error::{PipelineError, Result};
use crate::host::{self, format_bytes};

/// Runs the environment group and returns the daemon identity for the
/// compatibility checks.
pub(crate) async fn check(scope: &Scope<'_>, report: &mut ValidationReport) -> Result<ServerInfo> {
    match scope.engine.client_version().await {
        Ok(version) => report.record(CheckResult::pass("engine installed", version)),
        Err(e) => {
            let err = PipelineError::from_engine("engine installed", e);
            report.record(CheckResult::fail("engine installed", err.to_string(), err.hint()));
            return Err(err);
        }
    }

    let server = match scope.engine.server_info().await {
        Ok(info) => {
            report.record(CheckResult::pass(
                "daemon reachable",
                format!("daemon {} ({}/{})", info.version, info.os, info.arch),
            ));
            info
        }
        Err(e) => {
            let err = PipelineError::from_engine("daemon reachable", e);
            report.record(CheckResult::fail("daemon reachable", err.to_string(), err.hint()));
            return Err(err);
        }
    };

    let minimum = &scope.config.validation.min_engine_version;
    match (parse_major_minor(&server.version), parse_major_minor(minimum)) {
        (Some(have), Some(want)) if have >= want => report.record(CheckResult::pass(
            "engine version",
            format!("{} >= {}", server.version, minimum),
        )),
        (Some(_), _) => report.record(CheckResult::warn(
            "engine version",
            format!("{} is older than {}", server.version, minimum),
            "upgrade Docker Engine to a supported release",
        )),
        (None, _) => report.record(CheckResult::warn(
            "engine version",
            format!("cannot read engine version {:?}", server.version),
            "check `docker version` output",
        )),
    }

    if scope.engine.has_buildx().await {
        report.record(CheckResult::pass("buildx", "BuildKit front-end available"));
    } else {
        report.record(CheckResult::warn(
            "buildx",
            "buildx plugin not found; falling back to the classic builder",
            "install the docker-buildx plugin",
        ));
    }

    let min_disk = scope.config.validation.min_free_disk_bytes;
    match host::free_disk_bytes(scope.project_dir) {
        Some(free) if free >= min_disk => report.record(CheckResult::pass(
            "disk space",
            format!("{} free", format_bytes(free)),
        )),
        Some(free) => report.record(CheckResult::warn(
            "disk space",
            format!("{} free, {} recommended", format_bytes(free), format_bytes(min_disk)),
            "free space with `docker system prune` or remove old images",
        )),
        None => report.record(CheckResult::warn(
            "disk space",
            "cannot determine free space for the project volume",
            "check `df -h` manually",
        )),
    }

    Ok(server)
}
