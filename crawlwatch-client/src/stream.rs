//! Job event stream endpoint
//!
//! The backend pushes job updates as server-sent events. The browser
//! dashboard authenticates these with a `token` query parameter because
//! `EventSource` cannot send headers; the same URL shape is used here.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::ApiClient;
use crate::error::{ClientError, Result};
use crawlwatch_core::domain::job::JobId;

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Event name, `"message"` when the server did not set one
    pub event: String,
    /// Raw `data:` payload
    pub data: String,
}

/// Stream of frames from an open event stream connection
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamFrame>> + Send>>;

impl ApiClient {
    // =============================================================================
    // Job Events
    // =============================================================================

    /// Open the event stream for a job
    ///
    /// Sends `GET {base_url}/jobs/{job_id}/stream?token=...`. Returns once
    /// the server accepted the connection; frames are then read lazily from
    /// the returned stream. The stream ends when the server closes the
    /// connection.
    ///
    /// # Arguments
    /// * `job_id` - The job identifier
    pub async fn open_job_stream(&self, job_id: &JobId) -> Result<EventStream> {
        let api_key = self.api_key()?;
        let url = self.endpoint(&["jobs", job_id.as_str(), "stream"])?;

        debug!("Opening event stream for job {}", job_id);

        let response = self
            .client
            .get(url)
            .query(&[("token", api_key.expose())])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let response = self.check_status(response).await?;

        let frames = response.bytes_stream().eventsource().map(|event| {
            event
                .map(|event| StreamFrame {
                    event: if event.event.is_empty() {
                        "message".to_string()
                    } else {
                        event.event
                    },
                    data: event.data,
                })
                .map_err(|e| ClientError::StreamError(e.to_string()))
        });

        Ok(Box::pin(frames))
    }
}
