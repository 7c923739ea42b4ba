//! Data Transfer Objects for backend communication
//!
//! Wire messages from the scraping backend vary by job kind. This module
//! normalizes them into one transport-agnostic shape consumed by the
//! synchronization layer.

pub mod status;

pub use status::{StatusUpdate, UpdateParseError};
