//! Polling fallback driver
//!
//! Queries a job's status on a fixed cadence and forwards the results.
//! Used once a job's push channel has failed.

use std::sync::Arc;

use crawlwatch_client::ClientError;
use crawlwatch_core::domain::job::{JobId, JobKind};
use crawlwatch_core::dto::StatusUpdate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::StatusSource;

/// Outcome of one poll delivered to the driver's owner
#[derive(Debug)]
pub enum PollEvent {
    /// A successful status query
    Update(StatusUpdate),
    /// An auth or not-found failure; the driver has stopped
    Fatal(ClientError),
}

struct ActivePoll {
    job_id: JobId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Driver that polls a single job's status while running
///
/// Transient failures are logged and retried on the next tick for as long
/// as the driver runs. The first query is issued immediately on start.
pub struct PollingDriver {
    source: Arc<dyn StatusSource>,
    interval: Duration,
    active: Option<ActivePoll>,
}

impl PollingDriver {
    /// Creates a stopped driver
    pub fn new(source: Arc<dyn StatusSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            active: None,
        }
    }

    /// Starts polling a job, sending each outcome to `sink`
    ///
    /// Starting again while already polling the same job is a no-op and
    /// returns `false`. Starting for another job replaces the running poll.
    pub fn start(&mut self, job_id: JobId, kind: JobKind, sink: mpsc::Sender<PollEvent>) -> bool {
        if let Some(active) = &self.active {
            if active.job_id == job_id && !active.handle.is_finished() {
                debug!("Poller already running for job {}", job_id);
                return false;
            }
        }
        self.stop();

        info!(
            "Starting status polling for {} job {} (interval: {:?})",
            kind, job_id, self.interval
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.source),
            job_id.clone(),
            kind,
            self.interval,
            sink,
            cancel.clone(),
        ));

        self.active = Some(ActivePoll {
            job_id,
            cancel,
            handle,
        });
        true
    }

    /// Stops polling; a no-op when not running
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Stopping status polling for job {}", active.job_id);
            active.cancel.cancel();
            active.handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }
}

impl Drop for PollingDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    source: Arc<dyn StatusSource>,
    job_id: JobId,
    kind: JobKind,
    interval: Duration,
    sink: mpsc::Sender<PollEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        debug!("Polling status of job {}", job_id);

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = source.fetch_status(&job_id, kind) => result,
        };

        let event = match result {
            Ok(update) => PollEvent::Update(update),
            Err(e) if e.is_transient() => {
                warn!("Status poll for job {} failed, retrying: {}", job_id, e);
                continue;
            }
            Err(e) => {
                warn!("Status poll for job {} failed permanently: {}", job_id, e);
                let _ = sink.send(PollEvent::Fatal(e)).await;
                return;
            }
        };

        if sink.send(event).await.is_err() {
            debug!("Poll receiver for job {} dropped", job_id);
            return;
        }
    }
}
