//! Crawlwatch Sync
//!
//! Keeps a local, consistent view of long-running backend jobs.
//!
//! Architecture:
//! - Transport: trait seams over the status query and the event stream
//! - Stream: one push channel per job, with reconnect and silence detection
//! - Poller: fixed-cadence status queries used when streaming degrades
//! - Reconcile: the single, transport-agnostic state update policy
//! - Controller: owns each tracked job's state and transport, notifies
//!   subscribers
//!
//! A consumer calls [`SyncController::track`] and receives owned
//! [`SyncState`] snapshots until the job reaches a terminal status, becomes
//! unobservable, or the returned [`UnsubscribeHandle`] is used.
//!
//! [`SyncState`]: crawlwatch_core::domain::sync::SyncState

pub mod config;
pub mod controller;
pub mod poller;
pub mod reconcile;
pub mod stream;
pub mod subscriber;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, SyncConfig};
pub use controller::SyncController;
pub use poller::{PollEvent, PollingDriver};
pub use reconcile::{Reconciled, reconcile};
pub use stream::{ChannelError, ChannelEvent, StreamChannel};
pub use subscriber::{SnapshotSubscriber, UnsubscribeHandle};
pub use transport::{StatusSource, StreamConnector};
