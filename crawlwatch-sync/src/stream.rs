//! Streaming channel
//!
//! Wraps one push connection for one job. A background task reads frames,
//! parses them into [`StatusUpdate`]s and forwards them to the channel
//! owner. Like a browser `EventSource`, the task reconnects after a stream
//! error, but only a bounded number of times: once reconnecting fails, or
//! no update arrives for longer than the silence window, the channel
//! reports [`ChannelEvent::Closed`] and ends. The silence window spans
//! reconnects, so a server that keeps accepting and dropping connections
//! still ends the channel.

use std::sync::Arc;

use crawlwatch_client::{ClientError, EventStream};
use crawlwatch_core::domain::job::{JobId, JobKind};
use crawlwatch_core::dto::StatusUpdate;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::transport::StreamConnector;

const CHANNEL_CAPACITY: usize = 64;

/// Event delivered by a [`StreamChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A parsed update frame
    Update(StatusUpdate),
    /// The channel failed or the server finished the stream; always last
    Closed(String),
}

/// Failure to open a channel
#[derive(Debug, Error)]
#[error("failed to open event stream for job {job_id}: {source}")]
pub struct ChannelError {
    pub job_id: JobId,
    #[source]
    pub source: ClientError,
}

/// A push channel for a single job
///
/// Closing is idempotent and also happens on drop. After [`close`] returns,
/// [`next_event`] yields nothing.
///
/// [`close`]: StreamChannel::close
/// [`next_event`]: StreamChannel::next_event
pub struct StreamChannel {
    job_id: JobId,
    events: mpsc::Receiver<ChannelEvent>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

impl StreamChannel {
    /// Opens a channel for a job
    ///
    /// Fails if the initial connection is refused; no reconnect is attempted
    /// for the first connection.
    pub async fn open(
        connector: Arc<dyn StreamConnector>,
        job_id: JobId,
        kind: JobKind,
        config: &SyncConfig,
    ) -> Result<Self, ChannelError> {
        let frames = connector
            .connect(&job_id)
            .await
            .map_err(|source| ChannelError {
                job_id: job_id.clone(),
                source,
            })?;

        info!("Opened event stream for {} job {}", kind, job_id);

        let (tx, events) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let reader = StreamReader {
            connector,
            job_id: job_id.clone(),
            kind,
            config: config.clone(),
            tx,
            cancel: cancel.clone(),
            deadline: time::Instant::now() + config.silence_window,
        };
        let reader = tokio::spawn(reader.run(frames));

        Ok(Self {
            job_id,
            events,
            cancel,
            reader,
        })
    }

    /// Waits for the next event
    ///
    /// Returns `None` once the channel is closed or its reader has ended.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.events.recv().await
    }

    /// Closes the channel and stops any reconnection
    pub fn close(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!("Closing event stream for job {}", self.job_id);
        self.cancel.cancel();
        self.reader.abort();
        self.events.close();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background task reading one job's stream
struct StreamReader {
    connector: Arc<dyn StreamConnector>,
    job_id: JobId,
    kind: JobKind,
    config: SyncConfig,
    tx: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
    /// Moved forward by every delivered update only
    deadline: time::Instant,
}

/// How reading a connection ended
enum ReadEnd {
    Cancelled,
    Silent,
    Broken(String),
    Finished,
}

impl StreamReader {
    async fn run(mut self, mut frames: EventStream) {
        loop {
            let reason = match self.read(&mut frames).await {
                ReadEnd::Cancelled => return,
                ReadEnd::Finished => {
                    self.closed("server finished the stream".to_string()).await;
                    return;
                }
                ReadEnd::Silent => {
                    self.closed_silent().await;
                    return;
                }
                ReadEnd::Broken(reason) => reason,
            };

            warn!("Event stream for job {} broke: {}", self.job_id, reason);

            if time::Instant::now() >= self.deadline {
                self.closed_silent().await;
                return;
            }

            match self.reconnect().await {
                Some(reconnected) => frames = reconnected,
                None => {
                    if !self.cancel.is_cancelled() {
                        self.closed(format!(
                            "{} (after {} failed reconnect attempt(s))",
                            reason, self.config.reconnect_attempts
                        ))
                        .await;
                    }
                    return;
                }
            }
        }
    }

    /// Reads frames from one connection until it ends
    async fn read(&mut self, frames: &mut EventStream) -> ReadEnd {
        let mut finished = false;

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return ReadEnd::Cancelled,
                next = time::timeout_at(self.deadline, frames.next()) => next,
            };

            let frame = match next {
                Err(_) => return ReadEnd::Silent,
                Ok(None) if finished => return ReadEnd::Finished,
                Ok(None) => return ReadEnd::Broken("connection closed by server".to_string()),
                Ok(Some(Err(e))) if finished => {
                    debug!("Ignoring error after final frame for job {}: {}", self.job_id, e);
                    return ReadEnd::Finished;
                }
                Ok(Some(Err(e))) => return ReadEnd::Broken(e.to_string()),
                Ok(Some(Ok(frame))) => frame,
            };

            if frame.data.trim().is_empty() {
                continue;
            }

            let update = match StatusUpdate::parse(self.kind, &frame.data) {
                Ok(update) => update,
                Err(e) => {
                    debug!(
                        "Dropping malformed {} frame for job {}: {}",
                        frame.event, self.job_id, e
                    );
                    continue;
                }
            };

            finished |= update.done;

            if self.tx.send(ChannelEvent::Update(update)).await.is_err() {
                return ReadEnd::Cancelled;
            }
            self.deadline = time::Instant::now() + self.config.silence_window;
        }
    }

    /// Tries to re-establish the connection, bounded by the configuration
    async fn reconnect(&self) -> Option<EventStream> {
        for attempt in 1..=self.config.reconnect_attempts {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = time::sleep(self.config.reconnect_delay) => {}
            }

            debug!(
                "Reconnecting event stream for job {} (attempt {}/{})",
                self.job_id, attempt, self.config.reconnect_attempts
            );

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                connected = self.connector.connect(&self.job_id) => connected,
            };

            match connected {
                Ok(frames) => {
                    info!("Reconnected event stream for job {}", self.job_id);
                    return Some(frames);
                }
                Err(e) => warn!(
                    "Reconnect attempt {}/{} for job {} failed: {}",
                    attempt, self.config.reconnect_attempts, self.job_id, e
                ),
            }
        }

        None
    }

    async fn closed_silent(&self) {
        self.closed(format!(
            "no message within {:?}",
            self.config.silence_window
        ))
        .await;
    }

    async fn closed(&self, reason: String) {
        info!("Event stream for job {} closed: {}", self.job_id, reason);
        let _ = self.tx.send(ChannelEvent::Closed(reason)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedConnector, frame};
    use crawlwatch_core::domain::job::JobStatus;
    use std::time::Duration;

    fn job() -> JobId {
        JobId::new("job-1").unwrap()
    }

    fn config() -> SyncConfig {
        SyncConfig {
            poll_interval: Duration::from_secs(2),
            silence_window: Duration::from_secs(30),
            reconnect_attempts: 1,
            reconnect_delay: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_fails_when_connection_refused() {
        let connector = Arc::new(ScriptedConnector::new());
        connector.reject();

        let result = StreamChannel::open(connector.clone(), job(), JobKind::Crawl, &config()).await;

        assert!(result.is_err());
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_are_dropped() {
        let connector = Arc::new(ScriptedConnector::new());
        let session = connector.accept();
        let mut channel = StreamChannel::open(connector.clone(), job(), JobKind::Crawl, &config())
            .await
            .unwrap();

        session.unbounded_send(Ok(frame("{not json"))).unwrap();
        session.unbounded_send(Ok(frame(r#"{"status":"sleeping"}"#))).unwrap();
        session.unbounded_send(Ok(frame(""))).unwrap();
        session
            .unbounded_send(Ok(frame(
                r#"{"status":"running","completed_pages":2,"total_pages":9}"#,
            )))
            .unwrap();

        let event = channel.next_event().await.unwrap();
        assert_eq!(
            event,
            ChannelEvent::Update(StatusUpdate::new(JobStatus::Running).with_progress(2, 9))
        );
        assert!(!channel.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_then_failed_reconnect_closes() {
        let connector = Arc::new(ScriptedConnector::new());
        let session = connector.accept();
        connector.reject();
        let mut channel = StreamChannel::open(connector.clone(), job(), JobKind::Crawl, &config())
            .await
            .unwrap();

        session
            .unbounded_send(Err(ClientError::StreamError("reset".into())))
            .unwrap();

        let event = channel.next_event().await.unwrap();
        assert!(matches!(event, ChannelEvent::Closed(reason) if reason.contains("reset")));
        assert_eq!(connector.connects(), 2);
        assert_eq!(channel.next_event().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_reconnect_keeps_channel_open() {
        let connector = Arc::new(ScriptedConnector::new());
        let first = connector.accept();
        let second = connector.accept();
        let mut channel = StreamChannel::open(connector.clone(), job(), JobKind::Map, &config())
            .await
            .unwrap();

        drop(first);
        second
            .unbounded_send(Ok(frame(r#"{"status":"running","completed_pages":5}"#)))
            .unwrap();

        let event = channel.next_event().await.unwrap();
        assert!(matches!(event, ChannelEvent::Update(update) if update.completed == Some(5)));
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_window_closes_channel() {
        let connector = Arc::new(ScriptedConnector::new());
        let _session = connector.accept();
        let mut channel = StreamChannel::open(connector.clone(), job(), JobKind::Crawl, &config())
            .await
            .unwrap();

        let started = time::Instant::now();
        let event = channel.next_event().await.unwrap();

        assert!(matches!(event, ChannelEvent::Closed(reason) if reason.contains("no message")));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flapping_connections_close_after_silence_window() {
        let connector = Arc::new(ScriptedConnector::new());
        for _ in 0..500 {
            drop(connector.accept());
        }
        let config = SyncConfig {
            reconnect_delay: Duration::from_secs(1),
            ..config()
        };
        let mut channel = StreamChannel::open(connector.clone(), job(), JobKind::Crawl, &config)
            .await
            .unwrap();

        let started = time::Instant::now();
        let event = channel.next_event().await.unwrap();

        assert!(matches!(event, ChannelEvent::Closed(reason) if reason.contains("no message")));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(32));
        assert!(connector.connects() <= 32, "connects: {}", connector.connects());
        assert_eq!(channel.next_event().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_extend_silence_window_across_reconnects() {
        let connector = Arc::new(ScriptedConnector::new());
        let first = connector.accept();
        let second = connector.accept();
        let mut channel = StreamChannel::open(connector.clone(), job(), JobKind::Crawl, &config())
            .await
            .unwrap();

        time::sleep(Duration::from_secs(20)).await;
        first
            .unbounded_send(Ok(frame(r#"{"status":"running","completed_pages":1}"#)))
            .unwrap();
        assert!(matches!(channel.next_event().await, Some(ChannelEvent::Update(_))));
        drop(first);

        // Reconnected at ~20.1s; the window now runs until ~50s
        time::sleep(Duration::from_secs(25)).await;
        second
            .unbounded_send(Ok(frame(r#"{"status":"running","completed_pages":2}"#)))
            .unwrap();
        let event = channel.next_event().await.unwrap();
        assert!(matches!(event, ChannelEvent::Update(update) if update.completed == Some(2)));
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_frame_finishes_without_reconnect() {
        let connector = Arc::new(ScriptedConnector::new());
        let session = connector.accept();
        let mut channel = StreamChannel::open(connector.clone(), job(), JobKind::Crawl, &config())
            .await
            .unwrap();

        session
            .unbounded_send(Ok(frame(
                r#"{"status":"completed","completed_pages":4,"total_pages":4,"done":true}"#,
            )))
            .unwrap();
        drop(session);

        let update = channel.next_event().await.unwrap();
        assert!(matches!(update, ChannelEvent::Update(u) if u.done));
        let closed = channel.next_event().await.unwrap();
        assert!(matches!(closed, ChannelEvent::Closed(reason) if reason.contains("finished")));
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_and_silences_channel() {
        let connector = Arc::new(ScriptedConnector::new());
        let session = connector.accept();
        let mut channel = StreamChannel::open(connector.clone(), job(), JobKind::Crawl, &config())
            .await
            .unwrap();

        channel.close();
        channel.close();

        // A frame sent by the server after close never surfaces
        let _ = session.unbounded_send(Ok(frame(r#"{"status":"running"}"#)));
        assert!(channel.is_closed());
        assert_eq!(channel.next_event().await, None);
    }
}
