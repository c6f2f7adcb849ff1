//! Project tree manifest checks.

use super::report::{CheckResult, ValidationReport};
use super::Scope;
use crate::error::{PipelineError, Result};

pub(crate) fn check(scope: &Scope<'_>, report: &mut ValidationReport) -> Result<()> {
    let project = &scope.config.project;
    let mut missing = Vec::new();

    for file in &project.required_files {
        let name = format!("file {}", file);
        if scope.project_dir.join(file).is_file() {
            report.record(CheckResult::pass(name, "found"));
        } else {
            report.record(CheckResult::fail(
                name,
                "missing",
                format!("restore {} from version control", file),
            ));
            missing.push(file.clone());
        }
    }

    for dir in &project.required_dirs {
        let name = format!("directory {}/", dir);
        if scope.project_dir.join(dir).is_dir() {
            report.record(CheckResult::pass(name, "found"));
        } else {
            report.record(CheckResult::fail(
                name,
                "missing",
                format!("restore {}/ from version control", dir),
            ));
            missing.push(format!("{}/", dir));
        }
    }

    if !missing.is_empty() {
        return Err(PipelineError::config(
            "required files",
            format!("missing {}", missing.join(", ")),
            format!(
                "run from the project root or pass --project; checked {}",
                scope.project_dir.display()
            ),
        ));
    }

    for file in &project.optional_files {
        let name = format!("file {}", file);
        if scope.project_dir.join(file).exists() {
            report.record(CheckResult::pass(name, "found"));
        } else {
            report.record(CheckResult::warn(
                name,
                "optional file missing",
                format!("consider adding {}", file),
            ));
        }
    }
    Ok(())
}
