//! Domain model module declarations.

pub mod request;
pub mod response;
pub mod session;
