//! Transport layer
//!
//! The synchronization layer talks to the backend through two capabilities:
//! a one-shot status query and an event stream connection. Both are
//! trait-based so the controller does not depend on HTTP, and tests can
//! script them.

use async_trait::async_trait;
use crawlwatch_client::{ApiClient, ClientError, EventStream};
use crawlwatch_core::domain::job::{JobId, JobKind};
use crawlwatch_core::dto::StatusUpdate;

/// Source of one-shot job status queries
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetches the current status of a job
    ///
    /// Implementations must not retry; classification of the returned
    /// error (`is_auth`, `is_not_found`, `is_transient`) drives the caller.
    async fn fetch_status(&self, job_id: &JobId, kind: JobKind)
    -> Result<StatusUpdate, ClientError>;
}

/// Opens push connections for a job
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Connects to the job's event stream
    ///
    /// Returns once the connection is accepted. The stream ends when the
    /// server closes the connection.
    async fn connect(&self, job_id: &JobId) -> Result<EventStream, ClientError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(
        &self,
        job_id: &JobId,
        kind: JobKind,
    ) -> Result<StatusUpdate, ClientError> {
        ApiClient::fetch_status(self, job_id, kind).await
    }
}

#[async_trait]
impl StreamConnector for ApiClient {
    async fn connect(&self, job_id: &JobId) -> Result<EventStream, ClientError> {
        self.open_job_stream(job_id).await
    }
}
