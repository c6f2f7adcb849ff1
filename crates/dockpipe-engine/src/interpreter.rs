//! Host Python interpreter backend for [`SyntaxChecker`].

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::EngineError;
use crate::process::{args, Invocation};
use crate::traits::SyntaxChecker;
use crate::EngineResult;

/// Parses a file with `ast.parse`, which unlike `py_compile` leaves no
/// `__pycache__` behind in the project tree.
const PARSE_SNIPPET: &str =
    "import ast, sys\nwith open(sys.argv[1], 'rb') as fh:\n    ast.parse(fh.read(), sys.argv[1])\n";

/// Syntax checker backed by `python3`.
#[derive(Debug, Clone)]
pub struct PythonInterpreter {
    binary: String,
    timeout: Duration,
}

impl Default for PythonInterpreter {
    fn default() -> Self {
        Self {
            binary: "python3".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl PythonInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

/// Extract `X.Y.Z` from `Python X.Y.Z`.
fn parse_version(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|tok| tok.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

#[async_trait]
impl SyntaxChecker for PythonInterpreter {
    async fn version(&self) -> EngineResult<String> {
        let out = Invocation::captured(&self.binary, args(["--version"]))
            .with_timeout(self.timeout)
            .run_checked()
            .await?;
        parse_version(&out).ok_or_else(|| EngineError::Parse(out.trim().to_string()))
    }

    async fn check_file(&self, path: &Path) -> EngineResult<Option<String>> {
        let argv = vec![
            "-c".to_string(),
            PARSE_SNIPPET.to_string(),
            path.to_string_lossy().to_string(),
        ];
        let result = Invocation::captured(&self.binary, argv)
            .with_timeout(self.timeout)
            .run()
            .await?;
        if result.success() {
            return Ok(None);
        }
        // Last line of the traceback carries `SyntaxError: ...`
        let diagnostic = result
            .output
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("syntax error")
            .trim()
            .to_string();
        Ok(Some(diagnostic))
    }
}
