//! Smoke-run outcomes and the aggregate report.

use std::fmt;

/// Outcome of one smoke check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// The check ran and its assertion held.
    Passed,
    /// The check ran and its assertion did not hold.
    Failed,
    /// The check could not run meaningfully (no credential); skips are
    /// never counted as failures.
    Skipped,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASS"),
            Self::Failed => write!(f, "FAIL"),
            Self::Skipped => write!(f, "SKIP"),
        }
    }
}

/// One check's contribution to the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Stable check name.
    pub name: &'static str,
    /// Outcome.
    pub status: CheckStatus,
    /// Human-readable detail: what was asserted, or why it failed or was
    /// skipped. Diagnostic tails land here.
    pub detail: String,
}

impl CheckResult {
    /// Passing result.
    #[must_use]
    pub fn passed(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Passed,
            detail: detail.into(),
        }
    }

    /// Failing result.
    #[must_use]
    pub fn failed(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Failed,
            detail: detail.into(),
        }
    }

    /// Skipped result.
    #[must_use]
    pub fn skipped(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            detail: detail.into(),
        }
    }
}

/// Accumulated outcomes of one smoke run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmokeReport {
    checks: Vec<CheckResult>,
}

impl SmokeReport {
    /// Empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one check's outcome.
    pub fn push(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    /// All recorded outcomes, in run order.
    #[must_use]
    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks
            .iter()
            .filter(|check| check.status == status)
            .count()
    }

    /// Whether any check failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.count(CheckStatus::Failed) > 0
    }

    /// Whether the run passed everything it ran but skipped some checks.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.has_failures() && self.count(CheckStatus::Skipped) > 0
    }

    /// Process exit code for the run: non-zero iff at least one check
    /// failed. Skips never affect it.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_failures())
    }

    /// Multi-line human-readable summary.
    #[must_use]
    pub fn render(&self) -> String {
        let width = self
            .checks
            .iter()
            .map(|check| check.name.len())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for check in &self.checks {
            out.push_str(&format!(
                "{} {:width$}  {}\n",
                check.status, check.name, check.detail
            ));
        }
        out.push_str(&format!(
            "\n{} passed, {} failed, {} skipped{}\n",
            self.count(CheckStatus::Passed),
            self.count(CheckStatus::Failed),
            self.count(CheckStatus::Skipped),
            if self.is_partial() { " (partial)" } else { "" },
        ));
        out
    }
}
