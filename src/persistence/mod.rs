//! Persistence layer modules.

pub mod session_store;

pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore};
