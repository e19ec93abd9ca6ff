//! Persisted session record, one per group folder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session-continuity record stored by the file session store.
///
/// Overwritten whole on every save; there is no merge. The record is
/// owned exclusively by the group folder it is keyed under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Workload-issued conversation identifier carried into the next turn.
    pub session_id: String,
    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Construct a record stamped with the current time.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            updated_at: Utc::now(),
        }
    }
}
