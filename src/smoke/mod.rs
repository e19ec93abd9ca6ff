//! Smoke-test orchestration.
//!
//! Four checks run in a fixed order against a configured host: image
//! presence, container start, agent response, and session status. A
//! failing check never aborts the run; every check contributes a line to
//! the final report. Agent-level checks are skipped, not failed, when no
//! credential is configured, and skips do not affect the exit code.
//!
//! Submodules:
//! - `report`: Per-check outcomes and the aggregate report.
//! - `checks`: The four checks and the runner that sequences them.

pub mod checks;
pub mod report;

pub use checks::run_smoke;
pub use report::{CheckResult, CheckStatus, SmokeReport};
