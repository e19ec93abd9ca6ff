//! Invocation result model parsed from the sentinel-framed payload.

use serde::{Deserialize, Serialize};

/// Workload-reported outcome of one invocation.
///
/// Exactly two values are recognized on the wire; any other `status`
/// string fails the strict parse and surfaces as a malformed-output
/// condition rather than growing a speculative variant here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    /// The workload completed the turn.
    Success,
    /// The workload ran but reports a turn-level failure.
    Error,
}

/// Parsed payload extracted from between the output sentinels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    /// Turn outcome; the only required field.
    pub status: WorkloadStatus,
    /// Human-readable payload: the reply on success, the error message on
    /// failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Replacement session identifier for the next turn, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_session_id: Option<String>,
}

impl InvocationResult {
    /// Whether the workload reported the turn as successful.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == WorkloadStatus::Success
    }

    /// The human-readable payload, or an empty string when absent.
    #[must_use]
    pub fn result_text(&self) -> &str {
        self.result.as_deref().unwrap_or_default()
    }
}
