//! One full request/response turn against a container workload.
//!
//! The invoker wires the pieces together: session lookup, payload
//! encoding, name reservation, spawn, capture, the watchdog, the close
//! watcher, decode, and session write-through. Background tasks are all
//! cancelled and awaited before the invocation name is released, so no
//! stop request or close marker can ever land on a later invocation
//! reusing the name.

use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, Result};
use crate::ipc::IpcDir;
use crate::models::request::InvocationRequest;
use crate::models::response::InvocationResult;
use crate::persistence::SessionStore;
use crate::workload::framing::{decode_result, TAIL_LINES};
use crate::workload::reader::spawn_capture;
use crate::workload::spawner::{
    request_stop, spawn_workload, write_payload, InvocationNames, WorkloadProcess,
};
use crate::workload::{shared_capture, CapturedOutput, ContainerSpec, Mount};

use super::watchdog::{Watchdog, WatchdogOutcome};

/// Container-side mount point of the group workspace.
pub const GROUP_MOUNT: &str = "/workspace/group";

/// Container-side mount point of the shared IPC tree.
pub const IPC_MOUNT: &str = "/workspace/ipc";

/// Container environment variable selecting the agent model.
pub const MODEL_ENV_VAR: &str = "ANTHROPIC_MODEL";

/// Bound on waiting for capture tasks after the workload ends.
const READER_DRAIN: Duration = Duration::from_secs(2);

/// Per-turn invocation parameters.
#[derive(Debug, Clone)]
pub struct InvocationOptions {
    /// Group folder this turn belongs to.
    pub group: String,
    /// User prompt. Must be non-empty.
    pub prompt: String,
    /// Whether the turn runs in the primary channel.
    pub is_main: bool,
    /// Whether the turn was triggered by a schedule.
    pub is_scheduled_task: bool,
}

impl InvocationOptions {
    /// Interactive turn with the defaults (primary channel, unscheduled).
    #[must_use]
    pub fn new(group: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            prompt: prompt.into(),
            is_main: true,
            is_scheduled_task: false,
        }
    }
}

/// What a completed successful turn produced.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    /// Reply text from the workload.
    pub reply: String,
    /// Session identifier the next turn will resume from.
    pub session_id: Option<String>,
    /// Workload process exit code; `None` when signal-killed.
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the turn.
    pub duration: Duration,
}

enum WaitEnd {
    Exited(Option<i32>),
    TimedOut,
    CancelledByCaller,
}

/// Run one complete invocation turn.
///
/// The flow: load the stored session for the group, encode the payload,
/// reserve the container name, spawn the workload under capture with the
/// watchdog armed and the close watcher polling, wait for it to end,
/// decode the sentinel frame, write the new session id through, and
/// surface the workload's own status.
///
/// `cancel` aborts the turn from outside (Ctrl-C); the workload gets the
/// same graceful-stop-then-kill treatment as a timeout.
///
/// # Errors
///
/// - [`HarnessError::Config`] — empty prompt.
/// - [`HarnessError::NameConflict`] — an invocation for this group is
///   already running.
/// - [`HarnessError::Launch`] — the runtime could not be spawned.
/// - [`HarnessError::Timeout`] — the watchdog fired first.
/// - [`HarnessError::MalformedOutput`] — no valid sentinel frame.
/// - [`HarnessError::Workload`] — the workload reported `status: error`.
/// - [`HarnessError::Session`] / [`HarnessError::Ipc`] — state plumbing.
pub async fn run_invocation(
    config: &HarnessConfig,
    names: &InvocationNames,
    store: &dyn SessionStore,
    opts: &InvocationOptions,
    cancel: &CancellationToken,
) -> Result<InvocationOutcome> {
    if opts.prompt.trim().is_empty() {
        return Err(HarnessError::Config("prompt must not be empty".into()));
    }

    let started = Instant::now();
    let prior_session = store.load(&opts.group)?.map(|record| record.session_id);
    let request = build_request(config, opts, prior_session.clone());

    let name = config.container.invocation_name(&opts.group);
    let reservation = names.reserve(&name)?;

    let workspace = config.group_workspace_dir(&opts.group);
    std::fs::create_dir_all(&workspace).map_err(|err| {
        HarnessError::Io(format!("failed to create {}: {err}", workspace.display()))
    })?;
    let ipc = IpcDir::new(config.ipc_dir(&opts.group));
    ipc.ensure_layout()?;

    let spec = build_spec(config, &name, &workspace, &ipc);
    info!(
        group = %opts.group,
        name = %name,
        resuming = prior_session.is_some(),
        "invocation started"
    );

    let WorkloadProcess {
        mut child,
        stdin,
        stdout,
        stderr,
    } = spawn_workload(&spec)?;

    let stdout_capture = shared_capture();
    let stderr_capture = shared_capture();
    let readers_cancel = CancellationToken::new();
    let stdout_task = spawn_capture(
        "stdout",
        stdout,
        stdout_capture.clone(),
        readers_cancel.clone(),
    );
    let stderr_task = spawn_capture(
        "stderr",
        stderr,
        stderr_capture.clone(),
        readers_cancel.clone(),
    );

    // A write failure here usually means the workload died on startup;
    // the exit path below turns its stderr into a useful diagnostic.
    if let Err(err) = write_payload(stdin, &request).await {
        debug!(error = %err, "payload write failed; workload may have exited early");
    }

    let watchdog = Watchdog::new(
        spec.clone(),
        Duration::from_secs(config.timeouts.invoke_seconds),
        config.timeouts.stop_grace_seconds,
    )
    .arm();
    let fired = watchdog.fired_token();

    let poller_cancel = CancellationToken::new();
    let poller = crate::ipc::spawn_close_watcher(
        stdout_capture.clone(),
        ipc.clone(),
        Duration::from_millis(config.timeouts.settle_delay_ms),
        Duration::from_millis(config.timeouts.poll_interval_ms),
        poller_cancel.clone(),
    );

    let wait_end = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => WaitEnd::Exited(status.code()),
            Err(err) => {
                warn!(error = %err, "wait on workload failed");
                WaitEnd::Exited(None)
            }
        },
        () = fired.cancelled() => WaitEnd::TimedOut,
        () = cancel.cancelled() => WaitEnd::CancelledByCaller,
    };

    let exit_code = match wait_end {
        WaitEnd::Exited(code) => code,
        WaitEnd::TimedOut => {
            // The watchdog already issued the graceful stop; give the
            // workload the grace period before the hard fallback.
            reap_with_grace(&mut child, config.timeouts.stop_grace_seconds).await
        }
        WaitEnd::CancelledByCaller => {
            info!(name = %name, "invocation cancelled; stopping workload");
            let grace = config.timeouts.stop_grace_seconds;
            let wait = Duration::from_secs(grace.saturating_add(2));
            if let Err(err) = request_stop(&spec, grace, wait).await {
                debug!(error = %err, "graceful stop after cancel failed");
            }
            reap_with_grace(&mut child, grace).await
        }
    };

    // Shutdown order: drain readers, stop the poller, disarm the
    // watchdog, and only then let the name reservation go. The drain is
    // bounded because a runtime helper can hold the pipes open past the
    // workload's own exit.
    let drain_cancel = readers_cancel.clone();
    let drain_guard = tokio::spawn(async move {
        tokio::time::sleep(READER_DRAIN).await;
        drain_cancel.cancel();
    });
    let _ = stdout_task.await;
    let _ = stderr_task.await;
    drain_guard.abort();
    poller_cancel.cancel();
    let _ = poller.await;
    let watchdog_outcome = watchdog.disarm().await;
    drop(reservation);

    let output = CapturedOutput {
        stdout: stdout_capture.lock().await.take_lines(),
        stderr: stderr_capture.lock().await.take_lines(),
        exit_code,
    };
    let duration = started.elapsed();

    match wait_end {
        WaitEnd::CancelledByCaller => {
            return Err(HarnessError::Workload("invocation cancelled".into()));
        }
        WaitEnd::TimedOut => {
            return Err(HarnessError::Timeout(config.timeouts.invoke_seconds));
        }
        WaitEnd::Exited(_) => {
            if watchdog_outcome == WatchdogOutcome::Fired {
                // Deadline and exit raced; the exit was observed first,
                // so the turn proceeds on the captured output.
                debug!(name = %name, "watchdog fired after workload exit");
            }
        }
    }

    let result = decode_output(&output)?;

    if let Some(ref new_id) = result.new_session_id {
        store.save(&opts.group, new_id)?;
        debug!(group = %opts.group, session_id = %new_id, "session written through");
    }

    let session_id = result.new_session_id.clone().or(prior_session);
    if result.is_success() {
        info!(
            group = %opts.group,
            exit_code = ?output.exit_code,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "invocation succeeded"
        );
        Ok(InvocationOutcome {
            reply: result.result_text().to_owned(),
            session_id,
            exit_code: output.exit_code,
            duration,
        })
    } else {
        let message = if result.result_text().is_empty() {
            "workload reported an error with no message".to_owned()
        } else {
            result.result_text().to_owned()
        };
        Err(HarnessError::Workload(message))
    }
}

fn build_request(
    config: &HarnessConfig,
    opts: &InvocationOptions,
    session_id: Option<String>,
) -> InvocationRequest {
    let chat_jid = config
        .agent
        .chat_jid
        .clone()
        .unwrap_or_else(|| format!("{}@g.us", opts.group));
    let mut request = InvocationRequest::new(
        opts.prompt.clone(),
        opts.group.clone(),
        chat_jid,
        config.agent.assistant_name.clone(),
    );
    request.session_id = session_id;
    request.is_main = opts.is_main;
    request.is_scheduled_task = opts.is_scheduled_task;
    request.secrets = config.secrets.clone();
    request
}

fn build_spec(
    config: &HarnessConfig,
    name: &str,
    workspace: &std::path::Path,
    ipc: &IpcDir,
) -> ContainerSpec {
    let mut spec = ContainerSpec::new(&config.container.runtime, &config.container.image, name);
    spec.mounts = vec![
        Mount::writable(workspace.to_path_buf(), GROUP_MOUNT),
        Mount::writable(ipc.root().to_path_buf(), IPC_MOUNT),
    ];
    if let Some(ref model) = config.agent.model {
        spec.env.push((MODEL_ENV_VAR.to_owned(), model.clone()));
    }
    spec.memory = Some(config.container.memory.clone());
    spec.cpus = Some(config.container.cpus.clone());
    spec.extra_args = config.container.extra_args.clone();
    spec
}

/// Wait out the grace period, then hard-kill whatever is left.
async fn reap_with_grace(child: &mut Child, grace_seconds: u64) -> Option<i32> {
    let grace = Duration::from_secs(grace_seconds.saturating_add(2));
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        Ok(Err(err)) => {
            warn!(error = %err, "wait on workload failed");
            None
        }
        Err(_elapsed) => {
            warn!("workload ignored graceful stop; killing");
            if let Err(err) = child.kill().await {
                warn!(error = %err, "kill failed");
            }
            child.wait().await.ok().and_then(|status| status.code())
        }
    }
}

fn decode_output(output: &CapturedOutput) -> Result<InvocationResult> {
    decode_result(&output.stdout).map_err(|err| match err {
        HarnessError::MalformedOutput { reason, tail } if tail.trim().is_empty() => {
            HarnessError::MalformedOutput {
                reason,
                tail: output.diagnostic_tail(TAIL_LINES),
            }
        }
        other => other,
    })
}
