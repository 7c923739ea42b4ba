//! Core domain types
//!
//! These types describe a backend job as observed by a client. They are
//! shared between the HTTP client (which produces them from wire messages)
//! and the synchronization layer (which owns and reconciles them).

pub mod job;
pub mod sync;
