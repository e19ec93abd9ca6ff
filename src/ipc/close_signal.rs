//! Close-marker delivery for lingering workloads.
//!
//! The entrypoint keeps its container alive after printing the output
//! frame until it sees a `_close` file in its IPC input directory. A
//! watcher task polls the shared stdout capture for the end marker and,
//! after a settle delay that lets trailing writes flush, drops the
//! marker file. Delivery is advisory: if the workload already exited or
//! the write fails, the invocation outcome is unaffected.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{HarnessError, Result};
use crate::workload::framing::{is_marker_line, OUTPUT_END};
use crate::workload::SharedCapture;

/// Filename of the close marker dropped into the input directory.
pub const CLOSE_MARKER: &str = "_close";

/// Per-group IPC directory layout.
///
/// The root is mounted into the container; the harness writes only under
/// `input/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcDir {
    root: PathBuf,
}

impl IpcDir {
    /// Layout rooted at `root` (typically `<project>/data/ipc/<group>`).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory root shared with the container.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the workload reads signals from.
    #[must_use]
    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    /// Path of the close marker file.
    #[must_use]
    pub fn close_marker_path(&self) -> PathBuf {
        self.input_dir().join(CLOSE_MARKER)
    }

    /// Create the directory tree and clear any stale close marker left
    /// by a previous invocation.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Ipc`] when the tree cannot be created or
    /// the stale marker cannot be removed.
    pub fn ensure_layout(&self) -> Result<()> {
        let input = self.input_dir();
        std::fs::create_dir_all(&input).map_err(|err| {
            HarnessError::Ipc(format!("failed to create {}: {err}", input.display()))
        })?;
        let marker = self.close_marker_path();
        match std::fs::remove_file(&marker) {
            Ok(()) => debug!(path = %marker.display(), "removed stale close marker"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(HarnessError::Ipc(format!(
                    "failed to remove stale marker {}: {err}",
                    marker.display()
                )))
            }
        }
        Ok(())
    }

    /// Write the zero-byte close marker.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Ipc`] when the file cannot be written.
    pub fn write_close_marker(&self) -> Result<()> {
        let marker = self.close_marker_path();
        std::fs::write(&marker, []).map_err(|err| {
            HarnessError::Ipc(format!("failed to write {}: {err}", marker.display()))
        })
    }
}

/// Spawn the close watcher for one invocation.
///
/// Polls `capture` every `poll_interval` until the end marker line
/// appears, waits `settle_delay` for trailing output to land, then
/// writes the close marker. Exits without writing when cancelled first
/// or when the stream closes without ever producing the marker.
///
/// The caller must cancel and await the handle before releasing the
/// invocation name; the task never outlives its invocation.
pub fn spawn_close_watcher(
    capture: SharedCapture,
    ipc: IpcDir,
    settle_delay: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut scanned = 0_usize;
        loop {
            if cancel.is_cancelled() {
                return;
            }
            {
                let buf = capture.lock().await;
                let lines = buf.lines();
                if lines[scanned..]
                    .iter()
                    .any(|line| is_marker_line(line, OUTPUT_END))
                {
                    break;
                }
                scanned = lines.len();
                if buf.is_closed() {
                    debug!("stream closed without end marker; close watcher idle exit");
                    return;
                }
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(poll_interval) => {}
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(settle_delay) => {}
        }

        match ipc.write_close_marker() {
            Ok(()) => debug!(path = %ipc.close_marker_path().display(), "close marker written"),
            Err(err) => warn!(error = %err, "close marker delivery failed"),
        }
    })
}
