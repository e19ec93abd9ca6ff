#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod smoke;
pub mod workload;

pub use config::HarnessConfig;
pub use errors::{HarnessError, Result};
