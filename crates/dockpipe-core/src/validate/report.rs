//! Check results, the scoring accumulator and the verdict.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Warn,
    Fail,
}

impl Outcome {
    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Pass => "✓",
            Outcome::Warn => "⚠",
            Outcome::Fail => "✗",
        }
    }
}

/// Result of one named check. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    name: String,
    outcome: Outcome,
    message: String,
    hint: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Pass,
            message: message.into(),
            hint: None,
        }
    }

    pub fn warn(
        name: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Warn,
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Fail,
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}

/// Overall verdict of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    PassWithWarnings,
    Fail,
}

impl Verdict {
    /// Rate ≥ 90 with at most 5 warnings passes outright; rate ≥ 80 passes
    /// with warnings. A 95% run with 6 warnings therefore lands in
    /// `PassWithWarnings`, not `Pass`.
    pub fn from_score(success_rate: u32, warnings: usize) -> Self {
        if success_rate >= 90 && warnings <= 5 {
            Verdict::Pass
        } else if success_rate >= 80 {
            Verdict::PassWithWarnings
        } else {
            Verdict::Fail
        }
    }

    pub fn is_passing(&self) -> bool {
        !matches!(self, Verdict::Fail)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::PassWithWarnings => "PASS WITH WARNINGS",
            Verdict::Fail => "FAIL",
        }
    }
}

/// Ordered results plus running counters.
///
/// `total` counts executed checks only; a group skipped because its input is
/// absent does not contribute. `passed + failures <= total` always holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    results: Vec<CheckResult>,
    passed: usize,
    total: usize,
    warnings: usize,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result and update the counters.
    pub fn record(&mut self, result: CheckResult) {
        self.total += 1;
        match result.outcome {
            Outcome::Pass => {
                self.passed += 1;
                info!(check = %result.name, "{} {}", result.outcome.symbol(), result.message);
            }
            Outcome::Warn => {
                self.warnings += 1;
                warn!(check = %result.name, "{} {}", result.outcome.symbol(), result.message);
            }
            Outcome::Fail => {
                warn!(check = %result.name, "{} {}", result.outcome.symbol(), result.message);
            }
        }
        self.results.push(result);
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == Outcome::Fail)
            .count()
    }

    /// `passed * 100 / total`, integer division; 0 for an empty report.
    pub fn success_rate(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        (self.passed * 100 / self.total) as u32
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_score(self.success_rate(), self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(passes: usize, warns: usize, fails: usize) -> ValidationReport {
        let mut r = ValidationReport::new();
        for i in 0..passes {
            r.record(CheckResult::pass(format!("p{}", i), "ok"));
        }
        for i in 0..warns {
            r.record(CheckResult::warn(format!("w{}", i), "meh", "fix it"));
        }
        for i in 0..fails {
            r.record(CheckResult::fail(format!("f{}", i), "bad", "fix it"));
        }
        r
    }

    #[test]
    fn test_counters_and_rate() {
        let r = report(7, 2, 1);
        assert_eq!(r.total(), 10);
        assert_eq!(r.passed(), 7);
        assert_eq!(r.warnings(), 2);
        assert_eq!(r.failures(), 1);
        assert_eq!(r.success_rate(), 70);
        assert!(r.passed() + r.failures() <= r.total());
    }

    #[test]
    fn test_rate_uses_floor() {
        // 2/3 = 66.6..%
        assert_eq!(report(2, 1, 0).success_rate(), 66);
    }

    #[test]
    fn test_empty_report_fails() {
        let r = ValidationReport::new();
        assert_eq!(r.success_rate(), 0);
        assert_eq!(r.verdict(), Verdict::Fail);
    }

    #[test]
    fn test_verdict_thresholds() {
        assert_eq!(Verdict::from_score(90, 3), Verdict::Pass);
        assert_eq!(Verdict::from_score(90, 5), Verdict::Pass);
        assert_eq!(Verdict::from_score(90, 6), Verdict::PassWithWarnings);
        assert_eq!(Verdict::from_score(85, 0), Verdict::PassWithWarnings);
        assert_eq!(Verdict::from_score(80, 12), Verdict::PassWithWarnings);
        assert_eq!(Verdict::from_score(79, 0), Verdict::Fail);
        assert_eq!(Verdict::from_score(75, 0), Verdict::Fail);
    }

    #[test]
    fn test_result_accessors() {
        let r = CheckResult::warn("buildx", "not available", "install buildx");
        assert_eq!(r.name(), "buildx");
        assert_eq!(r.outcome(), Outcome::Warn);
        assert_eq!(r.hint(), Some("install buildx"));
        assert_eq!(CheckResult::pass("x", "y").hint(), None);
    }
}
