//! Minimal Dockerfile reader.
//!
//! Understands line continuations, comments and multi-stage `FROM ... AS
//! name` headers. Instruction arguments are kept verbatim.

use std::path::Path;

use super::report::{CheckResult, ValidationReport};
use super::{fatal_config, Scope};
use crate::error::{PipelineError, Result};

/// One instruction with its 1-based starting line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub keyword: String,
    pub args: String,
    pub line: usize,
}

/// Parsed build recipe.
#[derive(Debug, Clone, Default)]
pub struct Recipe {
    instructions: Vec<Instruction>,
}

impl Recipe {
    pub fn parse(text: &str) -> Self {
        let mut instructions = Vec::new();
        let mut pending: Option<(usize, String)> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if pending.is_none() && (line.is_empty() || line.starts_with('#')) {
                continue;
            }
            // Comments inside a continuation are dropped by the engine too.
            if pending.is_some() && line.starts_with('#') {
                continue;
            }

            let (continues, body) = match line.strip_suffix('\\') {
                Some(rest) => (true, rest.trim_end()),
                None => (false, line),
            };
            let (start, mut acc) = pending.take().unwrap_or((idx + 1, String::new()));
            if !acc.is_empty() && !body.is_empty() {
                acc.push(' ');
            }
            acc.push_str(body);

            if continues {
                pending = Some((start, acc));
            } else if let Some(ins) = split_instruction(&acc, start) {
                instructions.push(ins);
            }
        }
        if let Some((start, acc)) = pending {
            if let Some(ins) = split_instruction(&acc, start) {
                instructions.push(ins);
            }
        }
        Self { instructions }
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.instructions
            .iter()
            .any(|i| i.keyword.eq_ignore_ascii_case(keyword))
    }

    /// Image references named by `FROM`, skipping `--platform=` flags.
    pub fn base_images(&self) -> Vec<&str> {
        self.of("FROM")
            .filter_map(|i| i.args.split_whitespace().find(|t| !t.starts_with("--")))
            .collect()
    }

    /// Stage names declared with `FROM image AS name`.
    pub fn stages(&self) -> Vec<&str> {
        self.of("FROM")
            .filter_map(|i| {
                let tokens: Vec<&str> = i.args.split_whitespace().collect();
                tokens
                    .iter()
                    .position(|t| t.eq_ignore_ascii_case("as"))
                    .and_then(|p| tokens.get(p + 1).copied())
            })
            .collect()
    }

    /// User the final stage runs as, if set.
    pub fn final_user(&self) -> Option<&str> {
        let last_from = self
            .instructions
            .iter()
            .rposition(|i| i.keyword == "FROM")
            .unwrap_or(0);
        self.instructions[last_from..]
            .iter()
            .rev()
            .find(|i| i.keyword == "USER")
            .map(|i| i.args.trim())
    }

    fn of<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a Instruction> + 'a {
        self.instructions.iter().filter(move |i| i.keyword == keyword)
    }
}

fn split_instruction(text: &str, line: usize) -> Option<Instruction> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (keyword, args) = match text.split_once(char::is_whitespace) {
        Some((k, a)) => (k, a.trim()),
        None => (text, ""),
    };
    Some(Instruction {
        keyword: keyword.to_ascii_uppercase(),
        args: args.to_string(),
        line,
    })
}

/// Recipe checks: base image and required instructions are fatal, a non-root
/// `USER` and a `HEALTHCHECK` are advisory. Skipped when the recipe is absent.
pub(crate) fn check(scope: &Scope<'_>, report: &mut ValidationReport) -> Result<()> {
    let file = &scope.config.project.recipe_file;
    let path = scope.project_dir.join(file);
    if !path.is_file() {
        return Ok(());
    }
    let recipe = Recipe::read(&path)?;

    match recipe.base_images().first() {
        Some(image) => report.record(CheckResult::pass(
            "recipe base image",
            format!("base image {}", image),
        )),
        None => {
            return Err(fatal_config(
                report,
                "recipe base image",
                format!("{} has no FROM instruction", file),
                format!("start {} with e.g. `FROM python:3.11-slim`", file),
            ))
        }
    }

    let mut missing = Vec::new();
    for required in &scope.config.validation.required_instructions {
        let name = format!("recipe {}", required);
        if required.split('|').any(|kw| recipe.has(kw)) {
            report.record(CheckResult::pass(name, "present"));
        } else {
            report.record(CheckResult::fail(
                name,
                "missing",
                format!("add a {} instruction to {}", required.replace('|', " or "), file),
            ));
            missing.push(required.clone());
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::config(
            "recipe instructions",
            format!("{} is missing {}", file, missing.join(", ")),
            format!("add the missing instructions to {}", file),
        ));
    }

    match recipe.final_user() {
        Some(user) if !is_root_user(user) => {
            report.record(CheckResult::pass("recipe user", format!("runs as {}", user)))
        }
        Some(user) => report.record(CheckResult::warn(
            "recipe user",
            format!("final stage runs as {}", user),
            "switch to an unprivileged user, e.g. `USER appuser`",
        )),
        None => report.record(CheckResult::warn(
            "recipe user",
            "no USER instruction; the container runs as root",
            "add `RUN useradd -m appuser` and `USER appuser` after installing dependencies",
        )),
    }

    if recipe.has("HEALTHCHECK") {
        report.record(CheckResult::pass("recipe healthcheck", "present"));
    } else {
        report.record(CheckResult::warn(
            "recipe healthcheck",
            "no HEALTHCHECK instruction",
            "add `HEALTHCHECK CMD curl -f http://localhost:8080/health || exit 1`",
        ));
    }
    Ok(())
}

/// Whether `user` names root (`root`, `0`, `root:root`, `0:0`).
pub fn is_root_user(user: &str) -> bool {
    let name = user.split(':').next().unwrap_or(user).trim();
    name == "root" || name == "0"
}

/// `major.minor` from a `python:X.Y...` image reference.
pub fn python_tag_version(image: &str) -> Option<(u32, u32)> {
    let (repo, tag) = image.rsplit_once(':')?;
    let repo = repo.rsplit('/').next().unwrap_or(repo);
    if repo != "python" {
        return None;
    }
    super::parse_major_minor(tag)
}
