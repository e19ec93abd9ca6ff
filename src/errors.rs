//! Error types shared across the harness.

use std::fmt::{Display, Formatter};

/// Shared harness result type.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Harness error enumeration covering all domain failure modes.
///
/// The four workload-facing kinds map to distinct user-visible conditions:
/// `Launch` (the runtime or image is missing and the workload never
/// started), `MalformedOutput` (no parseable sentinel-framed payload),
/// `Workload` (the payload parsed but reported `status = error`), and
/// `Timeout` (the watchdog fired). A non-zero exit code on its own is
/// none of these; it is returned to callers as data.
#[derive(Debug)]
pub enum HarnessError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The workload process could not be started. Fatal, never retried.
    Launch(String),
    /// The invocation name is already held by a running invocation.
    NameConflict(String),
    /// Sentinel markers missing or the enclosed payload failed to parse.
    MalformedOutput {
        /// What went wrong with the framing or parse.
        reason: String,
        /// Raw enclosed text (or bounded output tail) for diagnostics.
        tail: String,
    },
    /// The workload produced a well-formed payload with `status = error`.
    Workload(String),
    /// The watchdog deadline elapsed and the workload was stopped.
    Timeout(u64),
    /// Session-state persistence failure.
    Session(String),
    /// Shared IPC directory failure.
    Ipc(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for HarnessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::NameConflict(name) => {
                write!(f, "name conflict: invocation '{name}' is already running")
            }
            Self::MalformedOutput { reason, tail } => {
                if tail.is_empty() {
                    write!(f, "malformed output: {reason}")
                } else {
                    write!(f, "malformed output: {reason}\n--- captured tail ---\n{tail}")
                }
            }
            Self::Workload(msg) => write!(f, "workload error: {msg}"),
            Self::Timeout(secs) => {
                write!(f, "timeout: workload exceeded {secs}s deadline and was stopped")
            }
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl HarnessError {
    /// Process exit code used when this error terminates the CLI.
    ///
    /// Each workload-facing kind gets a stable, distinct code so shell
    /// callers can branch on the failure class without parsing stderr.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Launch(_) => 3,
            Self::NameConflict(_) => 4,
            Self::MalformedOutput { .. } => 5,
            Self::Workload(_) => 6,
            Self::Timeout(_) => 7,
            Self::Session(_) | Self::Ipc(_) | Self::Io(_) => 1,
        }
    }

    /// Whether a prompt loop should keep running after this error.
    ///
    /// Turn-level failures (the workload answered badly or too slowly)
    /// are recoverable; infrastructure failures are not.
    #[must_use]
    pub const fn is_turn_level(&self) -> bool {
        matches!(
            self,
            Self::MalformedOutput { .. } | Self::Workload(_) | Self::Timeout(_)
        )
    }
}

impl std::error::Error for HarnessError {}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
