//! Invocation request model matching the entrypoint wire contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One container invocation, serialised as a single JSON document on the
/// workload's standard input.
///
/// Field names follow the entrypoint contract verbatim. `session_id` is
/// omitted from the wire when unset; its absence is what tells the
/// workload to start a new session, so an empty string is never sent in
/// its place. `secrets` is always present, possibly empty. Keys are kept
/// in a `BTreeMap` so encoding is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    /// User prompt for this turn. Required, non-empty.
    pub prompt: String,
    /// Conversation to continue; absent on the first turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Workspace folder identifier scoping the mounted working directory.
    pub group_folder: String,
    /// Routing identifier (conversation/group key), passed through verbatim.
    pub chat_jid: String,
    /// Whether this invocation runs in the primary channel.
    pub is_main: bool,
    /// Whether this invocation was triggered by a schedule.
    pub is_scheduled_task: bool,
    /// Assistant display name.
    pub assistant_name: String,
    /// Credential map. The caller configures at most one of the two
    /// recognized kinds; the codec passes whatever it is given.
    pub secrets: BTreeMap<String, String>,
}

impl InvocationRequest {
    /// Construct a request for one turn with the harness defaults
    /// (primary channel, not scheduled, no session, no secrets).
    #[must_use]
    pub fn new(
        prompt: impl Into<String>,
        group_folder: impl Into<String>,
        chat_jid: impl Into<String>,
        assistant_name: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: None,
            group_folder: group_folder.into(),
            chat_jid: chat_jid.into(),
            is_main: true,
            is_scheduled_task: false,
            assistant_name: assistant_name.into(),
            secrets: BTreeMap::new(),
        }
    }
}
