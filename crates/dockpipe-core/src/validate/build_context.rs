//! Build-context checks. Advisory only.

use super::report::{CheckResult, ValidationReport};
use super::Scope;
use crate::context::{self, ContextOptions, ContextReport};
use crate::host::format_bytes;

pub(crate) fn check(scope: &Scope<'_>, report: &mut ValidationReport) -> Option<ContextReport> {
    let validation = &scope.config.validation;
    let ignore_file = &scope.config.project.ignore_file;
    let opts = ContextOptions {
        ignore_file,
        large_file_bytes: validation.large_file_bytes,
        recommended_patterns: &validation.recommended_ignore_patterns,
    };

    let analysis = match context::analyze(scope.project_dir, &opts) {
        Ok(a) => a,
        Err(e) => {
            report.record(CheckResult::warn(
                "context size",
                format!("cannot walk the build context: {}", e),
                "check directory permissions",
            ));
            return None;
        }
    };

    if analysis.total_bytes <= validation.max_context_bytes {
        report.record(CheckResult::pass(
            "context size",
            format!(
                "{} in {} files",
                format_bytes(analysis.total_bytes),
                analysis.file_count
            ),
        ));
    } else {
        report.record(CheckResult::warn(
            "context size",
            format!(
                "{} exceeds {}",
                format_bytes(analysis.total_bytes),
                format_bytes(validation.max_context_bytes)
            ),
            format!("exclude data and virtualenvs in {}", ignore_file),
        ));
    }

    if analysis.large_files.is_empty() {
        report.record(CheckResult::pass("context large files", "none"));
    } else {
        let listed: Vec<String> = analysis
            .large_files
            .iter()
            .take(5)
            .map(|f| format!("{} ({})", f.path.display(), format_bytes(f.size_bytes)))
            .collect();
        report.record(CheckResult::warn(
            "context large files",
            format!("{} large file(s): {}", analysis.large_files.len(), listed.join(", ")),
            format!("move them out of the context or list them in {}", ignore_file),
        ));
    }

    if analysis.ignore_file_present {
        report.record(CheckResult::pass("context ignore file", format!("{} present", ignore_file)));
        if analysis.missing_ignore_patterns.is_empty() {
            report.record(CheckResult::pass("context ignore patterns", "recommended patterns present"));
        } else {
            report.record(CheckResult::warn(
                "context ignore patterns",
                format!("missing {}", analysis.missing_ignore_patterns.join(", ")),
                format!("append the missing patterns to {}", ignore_file),
            ));
        }
    } else {
        report.record(CheckResult::warn(
            "context ignore file",
            format!("no {}; the whole tree is sent to the engine", ignore_file),
            format!(
                "create {} with: {}",
                ignore_file,
                validation.recommended_ignore_patterns.join(" ")
            ),
        ));
    }

    Some(analysis)
}
