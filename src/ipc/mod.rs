//! Host-to-container IPC layer.
//!
//! The harness and the workload share a per-group directory tree on disk.
//! The only signal the harness sends through it is the close marker: a
//! zero-byte file that tells a lingering entrypoint its output has been
//! received and it may exit.

pub mod close_signal;

pub use close_signal::{spawn_close_watcher, IpcDir, CLOSE_MARKER};
