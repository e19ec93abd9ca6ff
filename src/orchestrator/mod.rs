//! Invocation orchestration modules.
//!
//! Covers the timeout watchdog and the invoker that composes one full
//! request/response turn against a container workload.

pub mod invoker;
pub mod watchdog;

pub use invoker::{run_invocation, InvocationOptions, InvocationOutcome};
pub use watchdog::{Watchdog, WatchdogHandle, WatchdogOutcome};
