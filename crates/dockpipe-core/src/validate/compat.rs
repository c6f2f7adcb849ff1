//! Platform and interpreter compatibility. Pass/Warn only.

use dockpipe_engine::ServerInfo;

use super::recipe::{python_tag_version, Recipe};
use super::report::{CheckResult, ValidationReport};
use super::{parse_major_minor, Scope};

/// Fold architecture aliases onto the engine's vocabulary.
pub fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" | "x86-64" => "amd64",
        "aarch64" | "arm64/v8" => "arm64",
        other => other,
    }
}

pub(crate) async fn check(scope: &Scope<'_>, server: &ServerInfo, report: &mut ValidationReport) {
    let native = normalize_arch(&server.arch);
    match scope.platform {
        Some(platform) => {
            let requested = platform.split_once('/').map_or(platform, |(_, arch)| arch);
            if normalize_arch(requested) == native {
                report.record(CheckResult::pass("platform", format!("{} is native", platform)));
            } else {
                report.record(CheckResult::warn(
                    "platform",
                    format!("{} differs from the engine ({}/{}); the build is emulated", platform, server.os, native),
                    "expect a slower build, or drop --platform for local testing",
                ));
            }
        }
        None => report.record(CheckResult::pass(
            "platform",
            format!("native {}/{}", server.os, native),
        )),
    }

    let recipe_path = scope.project_dir.join(&scope.config.project.recipe_file);
    let image_version = Recipe::read(&recipe_path)
        .ok()
        .and_then(|r| r.base_images().first().and_then(|img| python_tag_version(img)));
    let Some((img_major, img_minor)) = image_version else {
        return;
    };

    match scope.interpreter.version().await {
        Ok(host) => match parse_major_minor(&host) {
            Some((major, minor)) if (major, minor) == (img_major, img_minor) => {
                report.record(CheckResult::pass(
                    "interpreter version",
                    format!("host {} matches image {}.{}", host, img_major, img_minor),
                ))
            }
            _ => report.record(CheckResult::warn(
                "interpreter version",
                format!("host {} vs image {}.{}; local results may differ", host, img_major, img_minor),
                format!("use Python {}.{} locally (pyenv or a virtualenv)", img_major, img_minor),
            )),
        },
        Err(_) => report.record(CheckResult::warn(
            "interpreter version",
            "python3 not found on the host",
            format!("install Python {}.{} to run tests outside the container", img_major, img_minor),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_arch() {
        assert_eq!(normalize_arch("x86_64"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("riscv64"), "riscv64");
    }
}
