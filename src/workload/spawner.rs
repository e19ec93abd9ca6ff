//! Workload process spawner and invocation name registry.
//!
//! Spawns container runtime processes with:
//! - `kill_on_drop(true)` so runtime clients are cleaned up automatically.
//! - Piped stdio on all three streams; the request payload goes in through
//!   stdin and capture tasks drain stdout/stderr.
//! - A process-wide name registry so two invocations can never address the
//!   same container name concurrently.
//!
//! Secrets never appear on the command line or in the container
//! environment; they travel only inside the stdin payload.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::errors::{HarnessError, Result};
use crate::models::request::InvocationRequest;

use super::ContainerSpec;

// ── Name registry ────────────────────────────────────────────────────────────

/// Process-wide registry of container names with a live invocation.
///
/// Reserving a name that is already held fails fast instead of letting the
/// runtime reject the duplicate `--name` later with a less useful error.
#[derive(Debug, Clone, Default)]
pub struct InvocationNames {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InvocationNames {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` for the duration of one invocation.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::NameConflict`] when the name is already
    /// reserved by a running invocation.
    pub fn reserve(&self, name: &str) -> Result<NameReservation> {
        let mut held = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !held.insert(name.to_owned()) {
            return Err(HarnessError::NameConflict(name.to_owned()));
        }
        Ok(NameReservation {
            name: name.to_owned(),
            registry: Arc::clone(&self.inner),
        })
    }

    /// Whether `name` is currently reserved.
    #[must_use]
    pub fn is_reserved(&self, name: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}

/// Held reservation for one invocation name.
///
/// The name returns to the pool when this guard drops. The orchestrator
/// keeps the guard alive until the watchdog has been disarmed and awaited,
/// so a stop request can never race a new invocation under the same name.
#[derive(Debug)]
pub struct NameReservation {
    name: String,
    registry: Arc<Mutex<HashSet<String>>>,
}

impl NameReservation {
    /// Reserved name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NameReservation {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

// ── Process handle ───────────────────────────────────────────────────────────

/// Live workload process with its three stdio pipes detached.
#[derive(Debug)]
pub struct WorkloadProcess {
    /// Child handle, kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Workload stdin for the one-shot request payload.
    pub stdin: ChildStdin,
    /// Workload stdout, consumed by a capture task.
    pub stdout: ChildStdout,
    /// Workload stderr, consumed by a capture task.
    pub stderr: ChildStderr,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn a container workload from `spec`.
///
/// # Errors
///
/// Returns [`HarnessError::Launch`] when the runtime binary is missing or
/// the OS refuses the spawn, and when any stdio pipe cannot be captured.
pub fn spawn_workload(spec: &ContainerSpec) -> Result<WorkloadProcess> {
    let args = spec.run_args();
    debug!(runtime = %spec.runtime, name = %spec.name, "spawning workload");

    let mut child = Command::new(&spec.runtime)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                HarnessError::Launch(format!("runtime binary not found: {}", spec.runtime))
            } else {
                HarnessError::Launch(format!("failed to spawn {}: {err}", spec.runtime))
            }
        })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| HarnessError::Launch("failed to capture workload stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| HarnessError::Launch("failed to capture workload stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| HarnessError::Launch("failed to capture workload stderr".into()))?;

    Ok(WorkloadProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Write the single request payload to the workload and close its stdin.
///
/// The payload is one JSON document followed by a newline; dropping the
/// handle afterwards signals EOF so the workload knows the request is
/// complete.
///
/// # Errors
///
/// Returns [`HarnessError::Launch`] when serialisation fails and
/// [`HarnessError::Io`] when the pipe write fails.
pub async fn write_payload(mut stdin: ChildStdin, request: &InvocationRequest) -> Result<()> {
    let json = serde_json::to_string(request)
        .map_err(|err| HarnessError::Launch(format!("failed to encode request: {err}")))?;

    stdin
        .write_all(json.as_bytes())
        .await
        .map_err(|err| HarnessError::Io(format!("failed to write request payload: {err}")))?;
    stdin
        .write_all(b"\n")
        .await
        .map_err(|err| HarnessError::Io(format!("failed to write request payload: {err}")))?;
    stdin
        .shutdown()
        .await
        .map_err(|err| HarnessError::Io(format!("failed to close workload stdin: {err}")))?;
    Ok(())
}

/// Ask the runtime to stop the named container, bounded by `wait`.
///
/// This is the graceful half of timeout enforcement: `runtime stop -t
/// <grace> <name>` gives the workload `grace` seconds to exit on its own
/// before the runtime escalates. A failure here is logged and reported,
/// not fatal; the caller falls back to killing the client process.
///
/// # Errors
///
/// Returns [`HarnessError::Launch`] when the stop command cannot run,
/// exits non-zero, or does not finish within `wait`.
pub async fn request_stop(spec: &ContainerSpec, grace_seconds: u64, wait: Duration) -> Result<()> {
    let args = spec.stop_args(grace_seconds);
    debug!(runtime = %spec.runtime, name = %spec.name, grace_seconds, "requesting container stop");

    let status = tokio::time::timeout(
        wait,
        Command::new(&spec.runtime)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status(),
    )
    .await;

    match status {
        Ok(Ok(code)) if code.success() => Ok(()),
        Ok(Ok(code)) => {
            warn!(name = %spec.name, ?code, "container stop exited non-zero");
            Err(HarnessError::Launch(format!(
                "stop command for {} exited with {code}",
                spec.name
            )))
        }
        Ok(Err(err)) => Err(HarnessError::Launch(format!(
            "failed to run stop command: {err}"
        ))),
        Err(_elapsed) => Err(HarnessError::Launch(format!(
            "stop command for {} did not finish within {wait:?}",
            spec.name
        ))),
    }
}
