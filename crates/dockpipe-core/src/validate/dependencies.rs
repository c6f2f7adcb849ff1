//! Dependency manifest (`requirements.txt`) checks.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::report::{CheckResult, ValidationReport};
use super::Scope;
use crate::error::{PipelineError, Result};

/// One requirement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Lower-cased, `_` and `.` folded to `-`.
    pub name: String,
    pub line: usize,
    pub raw: String,
}

/// Parsed manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub requirements: Vec<Requirement>,
    /// Lines whose name or version specifier could not be read.
    pub malformed: Vec<(usize, String)>,
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(\[[^\]]*\])?\s*(.*)$")
            .expect("static regex")
    })
}

fn spec_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let clause = r"(?:===|==|>=|<=|~=|!=|>|<)\s*[A-Za-z0-9*][A-Za-z0-9.*+!_-]*";
        Regex::new(&format!(r"^{clause}(?:\s*,\s*{clause})*\s*(?:;.*)?$")).expect("static regex")
    })
}

pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase().replace(['_', '.'], "-")
}

impl Manifest {
    pub fn parse(text: &str) -> Self {
        let mut manifest = Manifest::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = match raw.find(" #") {
                Some(pos) => &raw[..pos],
                None => raw,
            }
            .trim();
            // Options such as `-r base.txt` or `--index-url` are not packages.
            if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
                continue;
            }

            let Some(caps) = name_re().captures(line) else {
                manifest.malformed.push((idx + 1, line.to_string()));
                continue;
            };
            let rest = caps.get(3).map_or("", |m| m.as_str()).trim();
            if !(rest.is_empty() || rest.starts_with(';') || spec_re().is_match(rest)) {
                manifest.malformed.push((idx + 1, line.to_string()));
                continue;
            }
            manifest.requirements.push(Requirement {
                name: normalize_name(&caps[1]),
                line: idx + 1,
                raw: line.to_string(),
            });
        }
        manifest
    }

    pub fn find(&self, name: &str) -> Option<&Requirement> {
        let wanted = normalize_name(name);
        self.requirements.iter().find(|r| r.name == wanted)
    }

    /// Names listed more than once.
    pub fn duplicates(&self) -> Vec<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for r in &self.requirements {
            *counts.entry(r.name.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

/// Manifest checks. Skipped when the manifest is absent.
pub(crate) fn check(scope: &Scope<'_>, report: &mut ValidationReport) -> Result<()> {
    let file = &scope.config.project.dependency_manifest;
    let path = scope.project_dir.join(file);
    if !path.is_file() {
        return Ok(());
    }
    let manifest = Manifest::parse(&std::fs::read_to_string(&path)?);

    let mut missing = Vec::new();
    for critical in &scope.config.validation.critical_dependencies {
        let name = format!("dependency {}", critical);
        match critical.split('|').find_map(|alt| manifest.find(alt)) {
            Some(req) => report.record(CheckResult::pass(name, req.raw.clone())),
            None => {
                let primary = critical.split('|').next().unwrap_or(critical);
                report.record(CheckResult::fail(
                    name,
                    format!("not listed in {}", file),
                    format!("add `{}` to {}", primary, file),
                ));
                missing.push(critical.clone());
            }
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::config(
            "critical dependencies",
            format!("{} is missing {}", file, missing.join(", ")),
            format!("add the missing packages to {} and rebuild", file),
        ));
    }

    let dups = manifest.duplicates();
    if dups.is_empty() {
        report.record(CheckResult::pass("dependency duplicates", "none"));
    } else {
        report.record(CheckResult::warn(
            "dependency duplicates",
            format!("listed more than once: {}", dups.join(", ")),
            format!("keep a single entry per package in {}", file),
        ));
    }

    if manifest.malformed.is_empty() {
        report.record(CheckResult::pass("dependency pins", "all version specifiers parse"));
    } else {
        let lines: Vec<String> = manifest
            .malformed
            .iter()
            .map(|(n, l)| format!("line {}: {}", n, l))
            .collect();
        report.record(CheckResult::warn(
            "dependency pins",
            format!("malformed entries: {}", lines.join("; ")),
            "use `name==1.2.3` style specifiers",
        ));
    }

    let count = manifest.requirements.len();
    let min = scope.config.validation.min_dependency_count;
    if count >= min {
        report.record(CheckResult::pass(
            "dependency count",
            format!("{} dependencies", count),
        ));
    } else {
        report.record(CheckResult::warn(
            "dependency count",
            format!("only {} dependencies (expected at least {})", count, min),
            format!("make sure {} is complete", file),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_names() {
        let m = Manifest::parse("Flask==2.3.3\npython_dotenv>=1.0\nzope.interface\n");
        let names: Vec<_> = m.requirements.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["flask", "python-dotenv", "zope-interface"]);
        assert!(m.find("python-dotenv").is_some());
        assert!(m.find("PYTHON_DOTENV").is_some());
    }

    #[test]
    fn test_parse_skips_comments_and_options() {
        let m = Manifest::parse("# core\n-r base.txt\n--index-url https://x\n\nflask  # web\n");
        assert_eq!(m.requirements.len(), 1);
        assert!(m.malformed.is_empty());
    }

    #[test]
    fn test_extras_markers_and_ranges() {
        let m = Manifest::parse(
            "uvicorn[standard]>=0.20,<1.0\npywin32==306 ; sys_platform == 'win32'\nrequests~=2.31\n",
        );
        assert_eq!(m.requirements.len(), 3);
        assert!(m.malformed.is_empty());
    }

    #[test]
    fn test_malformed_pins() {
        let m = Manifest::parse("flask=2.0\nopenai==\ngunicorn==21.2.0\n");
        assert_eq!(m.requirements.len(), 1);
        assert_eq!(m.malformed.len(), 2);
        assert_eq!(m.malformed[0].0, 1);
    }

    #[test]
    fn test_duplicates_after_normalization() {
        let m = Manifest::parse("psycopg2-binary==2.9\nPsycopg2_Binary==2.9.9\nflask\n");
        assert_eq!(m.duplicates(), vec!["psycopg2-binary".to_string()]);
    }
}
