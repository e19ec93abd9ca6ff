//! Per-group session persistence.
//!
//! Each workspace group owns at most one session record, stored as a
//! single JSON document under the state directory. Writes go through a
//! temporary file and an atomic rename so a crash mid-write can never
//! leave a half-written record behind; a reader sees either the old
//! session or the new one.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{HarnessError, Result};
use crate::models::session::SessionRecord;

/// Storage for the session identifier each group resumes from.
///
/// Implementations are synchronous; records are tiny and the store is
/// touched once per invocation, outside the hot capture path.
pub trait SessionStore: Send + Sync {
    /// Load the current record for `group`, `None` when the group has no
    /// stored session.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Session`] when the stored record exists
    /// but cannot be read or parsed.
    fn load(&self, group: &str) -> Result<Option<SessionRecord>>;

    /// Persist `session_id` as the record for `group`, replacing any
    /// previous record.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Session`] when the record cannot be
    /// written.
    fn save(&self, group: &str, session_id: &str) -> Result<SessionRecord>;

    /// Discard the record for `group`. Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Session`] when an existing record cannot
    /// be removed.
    fn reset(&self, group: &str) -> Result<bool>;
}

// ── File-backed store ────────────────────────────────────────────────────────

/// One JSON file per group under a sessions directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Store rooted at `dir`. The directory is created lazily on the
    /// first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the per-group records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, group: &str) -> Result<PathBuf> {
        validate_group_name(group)?;
        Ok(self.dir.join(format!("{group}.json")))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, group: &str) -> Result<Option<SessionRecord>> {
        let path = self.record_path(group)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(HarnessError::Session(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        let record: SessionRecord = serde_json::from_str(&raw).map_err(|err| {
            HarnessError::Session(format!(
                "corrupt session record {} ({err}); run `session reset` to discard it",
                path.display()
            ))
        })?;
        Ok(Some(record))
    }

    fn save(&self, group: &str, session_id: &str) -> Result<SessionRecord> {
        let path = self.record_path(group)?;
        fs::create_dir_all(&self.dir).map_err(|err| {
            HarnessError::Session(format!(
                "failed to create {}: {err}",
                self.dir.display()
            ))
        })?;

        let record = SessionRecord::new(session_id);
        let json = serde_json::to_string_pretty(&record)
            .map_err(|err| HarnessError::Session(format!("failed to encode record: {err}")))?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|err| {
            HarnessError::Session(format!("failed to stage session write: {err}"))
        })?;
        tmp.write_all(json.as_bytes())
            .map_err(|err| HarnessError::Session(format!("failed to stage session write: {err}")))?;
        tmp.persist(&path).map_err(|err| {
            HarnessError::Session(format!("failed to persist {}: {err}", path.display()))
        })?;

        debug!(group, session_id, path = %path.display(), "session record saved");
        Ok(record)
    }

    fn reset(&self, group: &str) -> Result<bool> {
        let path = self.record_path(group)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(HarnessError::Session(format!(
                "failed to remove {}: {err}",
                path.display()
            ))),
        }
    }
}

/// Reject group names that would escape the sessions directory or map to
/// surprising filenames.
fn validate_group_name(group: &str) -> Result<()> {
    let ok = !group.is_empty()
        && group != "."
        && group != ".."
        && !group.contains(['/', '\\'])
        && !group.contains('\0');
    if ok {
        Ok(())
    } else {
        Err(HarnessError::Session(format!(
            "invalid group name: {group:?}"
        )))
    }
}

// ── In-memory store ──────────────────────────────────────────────────────────

/// Map-backed store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, group: &str) -> Result<Option<SessionRecord>> {
        validate_group_name(group)?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group)
            .cloned())
    }

    fn save(&self, group: &str, session_id: &str) -> Result<SessionRecord> {
        validate_group_name(group)?;
        let record = SessionRecord::new(session_id);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group.to_owned(), record.clone());
        Ok(record)
    }

    fn reset(&self, group: &str) -> Result<bool> {
        validate_group_name(group)?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(group)
            .is_some())
    }
}
