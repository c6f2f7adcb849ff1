//! Security heuristics. Advisory only.

use std::sync::OnceLock;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use regex::Regex;

use super::report::{CheckResult, ValidationReport};
use super::Scope;
use crate::context::ContextReport;

/// Source files larger than this are not scanned for credentials.
const MAX_SCAN_BYTES: u64 = 1024 * 1024;

fn credential_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(password|passwd|secret|api[_-]?key|auth[_-]?token|access[_-]?token)["']?\s*[:=]\s*["'][^"'\s]{6,}["']|\bsk-[A-Za-z0-9]{20,}|\bAC[a-f0-9]{32}\b"#,
        )
        .expect("valid credential regex")
    })
}

fn secret_matcher(scope: &Scope<'_>) -> Option<Gitignore> {
    let mut builder = GitignoreBuilder::new(scope.project_dir);
    for pattern in &scope.config.validation.secret_file_patterns {
        if let Err(e) = builder.add_line(None, pattern) {
            tracing::debug!(pattern = %pattern, error = %e, "Skipping invalid secret pattern");
        }
    }
    builder.build().ok()
}

/// `path:line` for every line of `text` that looks like an embedded credential.
pub fn find_credentials(path: &str, text: &str) -> Vec<String> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| credential_re().is_match(line))
        .map(|(n, _)| format!("{}:{}", path, n + 1))
        .collect()
}

pub(crate) fn check(
    scope: &Scope<'_>,
    analysis: Option<&ContextReport>,
    report: &mut ValidationReport,
) {
    if let Some(analysis) = analysis {
        let flagged: Vec<String> = match secret_matcher(scope) {
            Some(matcher) => analysis
                .files
                .iter()
                .filter(|f| matcher.matched(&f.path, false).is_ignore())
                .map(|f| f.path.display().to_string())
                .collect(),
            None => Vec::new(),
        };
        if flagged.is_empty() {
            report.record(CheckResult::pass("secret files", "none in the build context"));
        } else {
            report.record(CheckResult::warn(
                "secret files",
                format!("sent to the engine: {}", flagged.join(", ")),
                format!("list them in {}", scope.config.project.ignore_file),
            ));
        }
    }

    let entrypoint = &scope.config.project.entrypoint_file;
    if let Ok(meta) = std::fs::metadata(scope.project_dir.join(entrypoint)) {
        match world_writable_mode(&meta) {
            Some(mode) => report.record(CheckResult::warn(
                "entrypoint permissions",
                format!("{} is world-writable (mode {:o})", entrypoint, mode),
                format!("chmod 644 {}", entrypoint),
            )),
            None => report.record(CheckResult::pass("entrypoint permissions", "not world-writable")),
        }
    }

    if let Some(analysis) = analysis {
        let ext = scope.config.project.source_extension.as_str();
        let mut findings = Vec::new();
        for file in analysis.files_with_extension(ext) {
            if file.size_bytes > MAX_SCAN_BYTES {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(scope.project_dir.join(&file.path)) else {
                continue;
            };
            findings.extend(find_credentials(&file.path.display().to_string(), &text));
        }
        if findings.is_empty() {
            report.record(CheckResult::pass("hard-coded credentials", "none found"));
        } else {
            let shown: Vec<&str> = findings.iter().take(5).map(String::as_str).collect();
            report.record(CheckResult::warn(
                "hard-coded credentials",
                format!("{} suspicious line(s): {}", findings.len(), shown.join(", ")),
                "read secrets from the environment (os.getenv) instead",
            ));
        }
    }
}

#[cfg(unix)]
fn world_writable_mode(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode() & 0o7777;
    (mode & 0o002 != 0).then_some(mode)
}

#[cfg(not(unix))]
fn world_writable_mode(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_heuristics() {
        let src = r#"
API_KEY = os.getenv("OPENAI_API_KEY")
password = "hunter2hunter2"
OPENAI_API_KEY = "sk-abcdefghijklmnopqrstuvwxyz"
db_password = ""
"#;
        let hits = find_credentials("config/settings.py", src);
        assert_eq!(
            hits,
            vec!["config/settings.py:3".to_string(), "config/settings.py:4".to_string()]
        );
    }

    #[test]
    fn test_twilio_sid_literal() {
        let hits = find_credentials("a.py", "sid = 'AC0123456789abcdef0123456789abcdef'\n");
        assert_eq!(hits.len(), 1);
    }
}
