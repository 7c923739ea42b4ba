//! Job synchronization controller
//!
//! Each call to [`SyncController::track`] spawns one task that exclusively
//! owns the job's [`SyncState`] and its transport. The task is the only
//! mutator of that state and processes transport events in arrival order.
//!
//! Lifecycle of a tracking:
//!
//! ```text
//! unattached -> streaming -> polling -> terminal
//!                    \__________________/
//! ```
//!
//! - the initial state comes from a status query, never from an assumption
//! - a failed stream is replaced by polling, silently; there is no way back
//! - a terminal status closes the transport after exactly one final snapshot
//! - auth and not-found failures end the tracking with a sync error

use std::sync::{Arc, Weak};

use crawlwatch_client::{ApiClient, ClientError};
use crawlwatch_core::domain::job::{JobId, JobKind};
use crawlwatch_core::domain::sync::{SyncError, SyncState, Transport};
use crawlwatch_core::dto::StatusUpdate;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::poller::{PollEvent, PollingDriver};
use crate::reconcile::{Reconciled, reconcile};
use crate::stream::{ChannelEvent, StreamChannel};
use crate::subscriber::{Registry, SnapshotSubscriber, TrackingLink, UnsubscribeHandle};
use crate::transport::{StatusSource, StreamConnector};

const POLL_BUFFER: usize = 16;

/// Tracks backend jobs and notifies subscribers of their state
///
/// Cheap to clone; clones share the set of live trackings.
#[derive(Clone)]
pub struct SyncController {
    status: Arc<dyn StatusSource>,
    connector: Arc<dyn StreamConnector>,
    config: SyncConfig,
    registry: Arc<Registry>,
}

impl SyncController {
    /// Creates a controller over explicit transports
    pub fn new(
        status: Arc<dyn StatusSource>,
        connector: Arc<dyn StreamConnector>,
        config: SyncConfig,
    ) -> Self {
        Self {
            status,
            connector,
            config,
            registry: Arc::new(Registry::default()),
        }
    }

    /// Creates a controller using one API client for both transports
    pub fn with_client(client: ApiClient, config: SyncConfig) -> Self {
        let client = Arc::new(client);
        Self::new(client.clone(), client, config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Starts tracking a job
    ///
    /// Returns immediately; snapshots are delivered to `subscriber` from a
    /// background task. Must be called within a Tokio runtime.
    ///
    /// Every tracking that is not unsubscribed ends with exactly one terminal
    /// snapshot: a terminal job status, or a sync error.
    pub fn track(
        &self,
        job_id: JobId,
        kind: JobKind,
        subscriber: impl SnapshotSubscriber,
    ) -> UnsubscribeHandle {
        let link = Arc::new(TrackingLink::new(job_id.clone()));
        self.registry.insert(Arc::clone(&link));

        info!("Tracking {} job {} ({})", kind, job_id, link.id);

        let task = JobSync {
            state: SyncState::new(job_id, kind),
            delivered: None,
            link: Arc::clone(&link),
            subscriber: Box::new(subscriber),
            status: Arc::clone(&self.status),
            connector: Arc::clone(&self.connector),
            config: self.config.clone(),
            registry: Arc::downgrade(&self.registry),
        };
        tokio::spawn(task.run());

        UnsubscribeHandle::new(link, Arc::downgrade(&self.registry))
    }

    /// Stops every tracking of a job
    ///
    /// Safe at any point, including before the first snapshot. Returns the
    /// number of trackings stopped.
    pub fn untrack(&self, job_id: &JobId) -> usize {
        let links = self.registry.remove_job(job_id);
        for link in &links {
            link.detach();
        }
        if !links.is_empty() {
            info!("Untracked job {} ({} tracking(s))", job_id, links.len());
        }
        links.len()
    }

    /// Number of trackings still running
    pub fn tracked_count(&self) -> usize {
        self.registry.len()
    }
}

/// Next thing a tracking task reacts to
enum Step {
    Stream(Option<ChannelEvent>),
    Poll(PollEvent),
}

/// State and transports of one tracking
struct JobSync {
    state: SyncState,
    /// Last snapshot handed to the subscriber
    delivered: Option<SyncState>,
    link: Arc<TrackingLink>,
    subscriber: Box<dyn SnapshotSubscriber>,
    status: Arc<dyn StatusSource>,
    connector: Arc<dyn StreamConnector>,
    config: SyncConfig,
    registry: Weak<Registry>,
}

impl JobSync {
    async fn run(mut self) {
        let link = Arc::clone(&self.link);

        tokio::select! {
            _ = link.cancel.cancelled() => {
                debug!("Tracking {} of job {} cancelled", link.id, link.job_id);
            }
            _ = self.synchronize() => {}
        }

        // Signals `UnsubscribeHandle::stopped` when the job ended on its own
        self.link.cancel.cancel();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.link.id);
        }
    }

    async fn synchronize(&mut self) {
        let job_id = self.state.job_id.clone();
        let kind = self.state.kind;

        match self.status.fetch_status(&job_id, kind).await {
            Ok(update) => {
                if self.apply(&update) {
                    info!("Job {} already finished: {}", job_id, self.state.status);
                    self.publish();
                    return;
                }
            }
            Err(e) if e.is_transient() => {
                warn!("Initial status query for job {} failed: {}", job_id, e);
            }
            Err(e) => {
                self.fail(e);
                return;
            }
        }

        let (poll_tx, mut poll_rx) = mpsc::channel(POLL_BUFFER);
        let mut poller = PollingDriver::new(Arc::clone(&self.status), self.config.poll_interval);

        let mut channel = match StreamChannel::open(
            Arc::clone(&self.connector),
            job_id.clone(),
            kind,
            &self.config,
        )
        .await
        {
            Ok(channel) => {
                self.state.transport = Transport::Stream;
                Some(channel)
            }
            Err(e) => {
                info!("Streaming unavailable, polling job {} instead: {}", job_id, e);
                self.state.transport = Transport::Poll;
                poller.start(job_id.clone(), kind, poll_tx.clone());
                None
            }
        };
        self.publish();

        loop {
            let step = tokio::select! {
                event = next_channel_event(&mut channel) => Step::Stream(event),
                Some(event) = poll_rx.recv() => Step::Poll(event),
            };

            match step {
                Step::Stream(Some(ChannelEvent::Update(update))) => {
                    if self.apply(&update) {
                        if let Some(mut channel) = channel.take() {
                            channel.close();
                        }
                        self.finish();
                        return;
                    }
                    self.publish();
                }
                Step::Stream(closed) => {
                    let reason = match closed {
                        Some(ChannelEvent::Closed(reason)) => reason,
                        _ => "channel ended".to_string(),
                    };
                    if let Some(mut channel) = channel.take() {
                        channel.close();
                    }
                    info!("Falling back to polling for job {}: {}", job_id, reason);
                    self.state.transport = Transport::Poll;
                    self.state.touch();
                    poller.start(job_id.clone(), kind, poll_tx.clone());
                    self.publish();
                }
                Step::Poll(PollEvent::Update(update)) => {
                    if self.apply(&update) {
                        poller.stop();
                        self.finish();
                        return;
                    }
                    self.publish();
                }
                Step::Poll(PollEvent::Fatal(e)) => {
                    poller.stop();
                    self.fail(e);
                    return;
                }
            }
        }
    }

    /// Reconciles an update; returns whether the job became terminal
    fn apply(&mut self, update: &StatusUpdate) -> bool {
        match reconcile(&mut self.state, update) {
            Reconciled::Ignored => {
                debug!("Ignoring update for finished job {}", self.state.job_id);
                false
            }
            Reconciled::Applied { terminal } => terminal,
        }
    }

    fn finish(&mut self) {
        info!(
            "Job {} reached terminal status {} ({})",
            self.state.job_id, self.state.status, self.state.progress
        );
        self.publish();
    }

    /// Ends the tracking because the job can no longer be observed
    fn fail(&mut self, error: ClientError) {
        let sync_error = if error.is_not_found() {
            SyncError::not_found(error.to_string())
        } else {
            SyncError::unauthorized(error.to_string())
        };
        warn!("Lost track of job {}: {}", self.state.job_id, sync_error);
        self.state.record_sync_error(sync_error);
        self.publish();
    }

    /// Delivers the current state if it differs from the last snapshot
    fn publish(&mut self) {
        if let Some(delivered) = &self.delivered {
            if delivered.same_content(&self.state) {
                return;
            }
        }

        let snapshot = self.state.clone();
        let subscriber = &self.subscriber;
        let delivered = self
            .link
            .gate
            .deliver(|| subscriber.on_snapshot(snapshot.clone()));

        if delivered {
            debug!(
                "Delivered snapshot for job {}: {} {} via {}",
                snapshot.job_id, snapshot.status, snapshot.progress, snapshot.transport
            );
            self.delivered = Some(snapshot);
        }
    }
}

async fn next_channel_event(channel: &mut Option<StreamChannel>) -> Option<ChannelEvent> {
    match channel {
        Some(channel) => channel.next_event().await,
        None => std::future::pending().await,
    }
}
