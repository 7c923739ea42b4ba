//! Subscriber contract
//!
//! Consumers receive owned [`SyncState`] snapshots through a
//! [`SnapshotSubscriber`] and stop receiving them with an
//! [`UnsubscribeHandle`].
//!
//! Delivery goes through a gate: the controller checks, under a lock, that
//! the tracking is still live before each callback, and unsubscribing takes
//! the same lock. Once `unsubscribe` returns, no further callback runs, even
//! if a stale transport is still delivering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

use crawlwatch_core::domain::job::JobId;
use crawlwatch_core::domain::sync::SyncState;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Receiver of job state snapshots
///
/// Called on the tracking's task; keep it short and non-blocking.
pub trait SnapshotSubscriber: Send + Sync + 'static {
    fn on_snapshot(&self, snapshot: SyncState);
}

impl<F> SnapshotSubscriber for F
where
    F: Fn(SyncState) + Send + Sync + 'static,
{
    fn on_snapshot(&self, snapshot: SyncState) {
        self(snapshot)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Gate serializing snapshot delivery against unsubscribing
#[derive(Default)]
pub(crate) struct DeliveryGate {
    closed: AtomicBool,
    delivering: Mutex<()>,
    deliverer: Mutex<Option<ThreadId>>,
}

impl DeliveryGate {
    /// Runs `deliver` unless the gate is closed; returns whether it ran
    pub(crate) fn deliver(&self, deliver: impl FnOnce()) -> bool {
        let _delivering = lock(&self.delivering);
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }

        *lock(&self.deliverer) = Some(thread::current().id());
        deliver();
        *lock(&self.deliverer) = None;
        true
    }

    /// Closes the gate and waits for an in-flight delivery to finish
    ///
    /// Closing from inside the callback does not wait (it would deadlock);
    /// the running callback is the last one either way.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        if *lock(&self.deliverer) == Some(thread::current().id()) {
            return;
        }
        drop(lock(&self.delivering));
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Shared link between a tracking task and its handle
pub(crate) struct TrackingLink {
    pub(crate) id: Uuid,
    pub(crate) job_id: JobId,
    pub(crate) gate: DeliveryGate,
    pub(crate) cancel: CancellationToken,
}

impl TrackingLink {
    pub(crate) fn new(job_id: JobId) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            gate: DeliveryGate::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops deliveries and cancels the tracking's task
    pub(crate) fn detach(&self) {
        self.gate.close();
        self.cancel.cancel();
    }
}

/// Live trackings of a controller
#[derive(Default)]
pub(crate) struct Registry {
    links: Mutex<HashMap<Uuid, Arc<TrackingLink>>>,
}

impl Registry {
    pub(crate) fn insert(&self, link: Arc<TrackingLink>) {
        lock(&self.links).insert(link.id, link);
    }

    pub(crate) fn remove(&self, id: &Uuid) -> Option<Arc<TrackingLink>> {
        lock(&self.links).remove(id)
    }

    /// Removes every tracking of a job, returning them
    pub(crate) fn remove_job(&self, job_id: &JobId) -> Vec<Arc<TrackingLink>> {
        let mut links = lock(&self.links);
        let ids: Vec<Uuid> = links
            .values()
            .filter(|link| &link.job_id == job_id)
            .map(|link| link.id)
            .collect();
        ids.iter().filter_map(|id| links.remove(id)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.links).len()
    }
}

/// Handle ending one tracking
///
/// Unsubscribing is idempotent and also happens on drop; bind the handle
/// for as long as snapshots are wanted.
#[must_use = "dropping the handle stops tracking immediately"]
pub struct UnsubscribeHandle {
    link: Arc<TrackingLink>,
    registry: Weak<Registry>,
}

impl UnsubscribeHandle {
    pub(crate) fn new(link: Arc<TrackingLink>, registry: Weak<Registry>) -> Self {
        Self { link, registry }
    }

    /// Stops tracking; no snapshot is delivered after this returns
    pub fn unsubscribe(&self) {
        if self.link.gate.is_closed() {
            return;
        }
        debug!("Unsubscribing tracking {} of job {}", self.link.id, self.link.job_id);
        self.link.detach();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.link.id);
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.link.job_id
    }

    /// Whether this tracking has been unsubscribed or untracked
    pub fn is_unsubscribed(&self) -> bool {
        self.link.gate.is_closed()
    }

    /// Resolves once the tracking's task has stopped for any reason
    pub async fn stopped(&self) {
        self.link.cancel.cancelled().await
    }
}

impl Drop for UnsubscribeHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
