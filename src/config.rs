//! Harness configuration parsing, validation, and credential loading.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{HarnessError, Result};

/// Environment variable carrying the API-key credential kind.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Environment variable carrying the OAuth-token credential kind.
pub const OAUTH_TOKEN_VAR: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// Container runtime settings for workload invocations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ContainerConfig {
    /// Container runtime binary (`podman` on the rootless hosts this
    /// harness targets; `docker` works where its CLI is compatible).
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Agent image to invoke.
    #[serde(default = "default_image")]
    pub image: String,
    /// Prefix for per-group container names.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Memory limit passed to the runtime (`--memory`).
    #[serde(default = "default_memory")]
    pub memory: String,
    /// CPU limit passed to the runtime (`--cpus`).
    #[serde(default = "default_cpus")]
    pub cpus: String,
    /// Extra arguments appended verbatim before the image name.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_runtime() -> String {
    "podman".into()
}

fn default_image() -> String {
    "nanoclaw-agent:latest".into()
}

fn default_name_prefix() -> String {
    "nanoclaw".into()
}

fn default_memory() -> String {
    "2g".into()
}

fn default_cpus() -> String {
    "2".into()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            image: default_image(),
            name_prefix: default_name_prefix(),
            memory: default_memory(),
            cpus: default_cpus(),
            extra_args: Vec::new(),
        }
    }
}

impl ContainerConfig {
    /// Deterministic container name for a group folder.
    ///
    /// One invocation per group folder runs at a time; a collision on this
    /// name means a previous invocation was not cleaned up and is reported
    /// as [`HarnessError::NameConflict`] rather than being papered over.
    #[must_use]
    pub fn invocation_name(&self, group_folder: &str) -> String {
        format!("{}-{group_folder}", self.name_prefix)
    }
}

/// Configurable timeout values for one container invocation.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Wall-clock deadline for a single invocation (seconds).
    #[serde(default = "default_invoke_seconds")]
    pub invoke_seconds: u64,
    /// Grace period handed to the runtime's `stop` verb (seconds).
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
    /// Delay between the end sentinel appearing and the `_close` marker
    /// being written, so trailing workload writes can land (milliseconds).
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Interval at which the close-signal watcher scans captured stdout
    /// (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_invoke_seconds() -> u64 {
    120
}

fn default_stop_grace_seconds() -> u64 {
    5
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            invoke_seconds: default_invoke_seconds(),
            stop_grace_seconds: default_stop_grace_seconds(),
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Agent identity settings passed through on the wire.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Assistant display name sent as `assistantName`.
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    /// Routing identifier sent as `chatJid`; derived from the group folder
    /// when unset.
    #[serde(default)]
    pub chat_jid: Option<String>,
    /// Model identifier exported to the container environment when set.
    #[serde(default)]
    pub model: Option<String>,
}

fn default_assistant_name() -> String {
    "Andy".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            chat_jid: None,
            model: None,
        }
    }
}

/// Global configuration parsed from `harness.toml`.
///
/// Every field has a default so the harness runs without a config file;
/// CLI flags override individual fields after parsing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HarnessConfig {
    /// Base directory of the cloned nanoclaw checkout. Group workspaces
    /// and IPC trees live underneath it.
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    /// Harness state directory (session records). Defaults to
    /// `<project_dir>/.harness` when unset.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Container runtime settings.
    #[serde(default)]
    pub container: ContainerConfig,
    /// Per-invocation timeout settings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Agent identity settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Credential map sent as `secrets` (populated at runtime from the
    /// environment, never from the TOML file).
    #[serde(skip)]
    pub secrets: BTreeMap<String, String>,
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            state_dir: None,
            container: ContainerConfig::default(),
            timeouts: TimeoutConfig::default(),
            agent: AgentConfig::default(),
            secrets: BTreeMap::new(),
        }
    }
}

impl HarnessConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` if the file cannot be read or
    /// contains invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| HarnessError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load workload credentials from environment variables.
    ///
    /// Recognizes the API-key kind ([`API_KEY_VAR`]) and the OAuth-token
    /// kind ([`OAUTH_TOKEN_VAR`]). The interactive flow configures exactly
    /// one; when both are present the OAuth token wins and a warning is
    /// logged so neither is ever dropped silently. When neither is present
    /// the map stays empty and agent-level smoke checks are skipped.
    pub fn load_credentials(&mut self) {
        let api_key = env::var(API_KEY_VAR).ok().filter(|v| !v.is_empty());
        let oauth_token = env::var(OAUTH_TOKEN_VAR).ok().filter(|v| !v.is_empty());

        match (api_key, oauth_token) {
            (Some(_), Some(token)) => {
                warn!(
                    "both {API_KEY_VAR} and {OAUTH_TOKEN_VAR} are set; \
                     sending only {OAUTH_TOKEN_VAR}"
                );
                self.secrets.insert(OAUTH_TOKEN_VAR.to_owned(), token);
            }
            (Some(key), None) => {
                self.secrets.insert(API_KEY_VAR.to_owned(), key);
            }
            (None, Some(token)) => {
                self.secrets.insert(OAUTH_TOKEN_VAR.to_owned(), token);
            }
            (None, None) => {}
        }
    }

    /// Whether any recognized credential is configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.secrets.is_empty()
    }

    /// Resolved harness state directory.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.project_dir.join(".harness"))
    }

    /// Directory holding persisted session records.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir().join("sessions")
    }

    /// Host-side workspace directory mounted for a group folder.
    #[must_use]
    pub fn group_workspace_dir(&self, group_folder: &str) -> PathBuf {
        self.project_dir.join("groups").join(group_folder)
    }

    /// Host-side shared IPC directory for a group folder.
    #[must_use]
    pub fn ipc_dir(&self, group_folder: &str) -> PathBuf {
        self.project_dir.join("data").join("ipc").join(group_folder)
    }

    /// Validate settings and canonicalize `project_dir`.
    ///
    /// Called automatically when loading from TOML; call again after
    /// applying CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` naming the offending field.
    pub fn validate(&mut self) -> Result<()> {
        if self.container.runtime.trim().is_empty() {
            return Err(HarnessError::Config("container.runtime must not be empty".into()));
        }
        if self.container.image.trim().is_empty() {
            return Err(HarnessError::Config("container.image must not be empty".into()));
        }
        if self.timeouts.invoke_seconds == 0 {
            return Err(HarnessError::Config(
                "timeouts.invoke_seconds must be greater than zero".into(),
            ));
        }
        if self.timeouts.stop_grace_seconds == 0 {
            return Err(HarnessError::Config(
                "timeouts.stop_grace_seconds must be greater than zero".into(),
            ));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(HarnessError::Config(
                "timeouts.poll_interval_ms must be greater than zero".into(),
            ));
        }

        let canonical_project = self
            .project_dir
            .canonicalize()
            .map_err(|err| HarnessError::Config(format!("project_dir invalid: {err}")))?;
        self.project_dir = canonical_project;

        Ok(())
    }
}
