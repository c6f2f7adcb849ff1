//! Source syntax checks through the host interpreter.

use std::io;
use std::path::{Path, PathBuf};

use dockpipe_engine::EngineError;
use ignore::WalkBuilder;

use super::report::{CheckResult, ValidationReport};
use super::Scope;
use crate::error::{PipelineError, Result};

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &["__pycache__", "node_modules", "venv", ".venv"];

fn skipped_dir(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

/// Source files under `dir`, sorted.
fn sources(dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_some_and(|t| t.is_dir())
                || !skipped_dir(&entry.file_name().to_string_lossy())
        })
        .build();

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let is_file = entry.file_type().is_some_and(|t| t.is_file());
        if is_file && entry.path().extension().is_some_and(|e| e == ext) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

enum GroupResult {
    Checked,
    InterpreterMissing,
}

/// Parse `files` and record one check named `name`.
///
/// Only diagnostics reported by the interpreter are fatal. A file the
/// interpreter could not be run on (timeout, IO failure) downgrades the
/// check to a warning.
async fn check_group(
    scope: &Scope<'_>,
    report: &mut ValidationReport,
    name: &str,
    files: &[PathBuf],
) -> Result<GroupResult> {
    let mut errors = Vec::new();
    let mut unverified = Vec::new();
    for file in files {
        let rel = file.strip_prefix(scope.project_dir).unwrap_or(file);
        match scope.interpreter.check_file(file).await {
            Ok(None) => {}
            Ok(Some(diagnostic)) => {
                errors.push(format!("{}: {}", rel.display(), diagnostic));
            }
            Err(EngineError::NotInstalled { program }) => {
                report.record(CheckResult::warn(
                    "syntax",
                    format!("{} not found; source syntax not verified", program),
                    "install Python 3 on the host to enable syntax checks",
                ));
                return Ok(GroupResult::InterpreterMissing);
            }
            Err(e) => {
                tracing::warn!(file = %rel.display(), error = %e, "Interpreter could not check file");
                unverified.push(format!("{}: {}", rel.display(), e));
            }
        }
    }

    if errors.is_empty() {
        if unverified.is_empty() {
            report.record(CheckResult::pass(
                name,
                format!("{} file(s) parse", files.len()),
            ));
        } else {
            report.record(CheckResult::warn(
                name,
                format!(
                    "{} of {} file(s) not verified: {}",
                    unverified.len(),
                    files.len(),
                    unverified.join("; ")
                ),
                "re-run `dockpipe validate`; check that python3 runs on the host",
            ));
        }
        return Ok(GroupResult::Checked);
    }
    report.record(CheckResult::fail(
        name,
        format!("{} file(s) with errors", errors.len()),
        "fix the reported syntax errors",
    ));
    Err(PipelineError::config(
        name,
        errors.join("; "),
        "fix the syntax errors above, then re-run `dockpipe validate`",
    ))
}

/// One check for the top-level sources, then one per required directory.
pub(crate) async fn check(scope: &Scope<'_>, report: &mut ValidationReport) -> Result<()> {
    let project = &scope.config.project;
    let ext = project.source_extension.as_str();

    let top_level: Vec<PathBuf> = project
        .required_files
        .iter()
        .filter(|f| Path::new(f).extension().is_some_and(|e| e == ext))
        .map(|f| scope.project_dir.join(f))
        .filter(|p| p.is_file())
        .collect();
    if !top_level.is_empty() {
        if let GroupResult::InterpreterMissing =
            check_group(scope, report, "syntax (top level)", &top_level).await?
        {
            return Ok(());
        }
    }

    for dir in &project.required_dirs {
        let path = scope.project_dir.join(dir);
        if !path.is_dir() {
            continue;
        }
        let files = sources(&path, ext)?;
        let name = format!("syntax {}/", dir);
        if files.is_empty() {
            report.record(CheckResult::pass(name, "no sources"));
            continue;
        }
        if let GroupResult::InterpreterMissing = check_group(scope, report, &name, &files).await? {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sources_skips_caches_and_hidden() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg/__pycache__")).unwrap();
        fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join("pkg/a.py"), "").unwrap();
        fs::write(dir.path().join("pkg/__pycache__/a.py"), "").unwrap();
        fs::write(dir.path().join(".hidden/b.py"), "").unwrap();
        fs::write(dir.path().join("c.txt"), "").unwrap();

        let found = sources(dir.path(), "py").unwrap();
        assert_eq!(found, vec![dir.path().join("pkg/a.py")]);
    }
}
