//! Invocation timeout watchdog.
//!
//! Each invocation arms one watchdog before its workload spawns. The
//! watchdog reaches exactly one of two terminal states: `Cancelled` when
//! the invocation finishes first and disarms it, or `Fired` when the
//! deadline passes. On fire it issues the runtime's graceful stop for the
//! invocation's container name and signals the foreground wait through a
//! shared token; the foreground owns the hard-kill fallback.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::workload::spawner::request_stop;
use crate::workload::ContainerSpec;

/// Extra seconds the stop command gets beyond the container grace period.
const STOP_WAIT_MARGIN_SECS: u64 = 5;

/// Terminal state of one watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// Deadline passed; the graceful stop was issued.
    Fired,
    /// Disarmed before the deadline.
    Cancelled,
}

/// Builder for one invocation's watchdog.
///
/// Call [`arm`](Self::arm) to start the timer task.
#[derive(Debug)]
pub struct Watchdog {
    spec: ContainerSpec,
    deadline: Duration,
    grace_seconds: u64,
}

impl Watchdog {
    /// Watchdog for the invocation described by `spec`.
    #[must_use]
    pub fn new(spec: ContainerSpec, deadline: Duration, grace_seconds: u64) -> Self {
        Self {
            spec,
            deadline,
            grace_seconds,
        }
    }

    /// Start the timer task and return its handle.
    #[must_use]
    pub fn arm(self) -> WatchdogHandle {
        let disarm = CancellationToken::new();
        let fired = CancellationToken::new();

        let task_disarm = disarm.clone();
        let task_fired = fired.clone();
        let join = tokio::spawn(async move {
            tokio::select! {
                () = task_disarm.cancelled() => {
                    debug!(name = %self.spec.name, "watchdog disarmed");
                    WatchdogOutcome::Cancelled
                }
                () = tokio::time::sleep(self.deadline) => {
                    warn!(
                        name = %self.spec.name,
                        deadline_secs = self.deadline.as_secs(),
                        "invocation deadline passed"
                    );
                    // Unblock the foreground wait first so its grace window
                    // runs concurrently with the stop command.
                    task_fired.cancel();
                    let wait =
                        Duration::from_secs(self.grace_seconds.saturating_add(STOP_WAIT_MARGIN_SECS));
                    if let Err(err) = request_stop(&self.spec, self.grace_seconds, wait).await {
                        warn!(name = %self.spec.name, error = %err, "graceful stop failed");
                    }
                    WatchdogOutcome::Fired
                }
            }
        });

        WatchdogHandle {
            disarm,
            fired,
            join: Some(join),
        }
    }
}

/// Control handle for an armed watchdog.
///
/// Dropping the handle disarms the timer; the invoker calls
/// [`disarm`](Self::disarm) explicitly so the terminal state is known
/// before the invocation name is released.
#[derive(Debug)]
pub struct WatchdogHandle {
    disarm: CancellationToken,
    fired: CancellationToken,
    join: Option<JoinHandle<WatchdogOutcome>>,
}

impl WatchdogHandle {
    /// Token cancelled at the moment the watchdog fires.
    #[must_use]
    pub fn fired_token(&self) -> CancellationToken {
        self.fired.clone()
    }

    /// Whether the watchdog has already fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.is_cancelled()
    }

    /// Disarm and await the timer task, returning its terminal state.
    ///
    /// Disarming after the deadline has passed still returns
    /// [`WatchdogOutcome::Fired`]; the stop command has completed (or
    /// failed) by the time this returns.
    pub async fn disarm(mut self) -> WatchdogOutcome {
        self.disarm.cancel();
        match self.join.take() {
            Some(join) => join.await.unwrap_or(WatchdogOutcome::Cancelled),
            None => WatchdogOutcome::Cancelled,
        }
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        self.disarm.cancel();
    }
}
