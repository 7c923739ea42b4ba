//! Job status endpoint

use crate::ApiClient;
use crate::error::{ClientError, Result};
use crawlwatch_core::domain::job::{JobId, JobKind};
use crawlwatch_core::dto::StatusUpdate;
use tracing::debug;

impl ApiClient {
    // =============================================================================
    // Job Status
    // =============================================================================

    /// Query the current status of a job
    ///
    /// Sends `GET {base_url}/jobs/{kind}/{job_id}` and normalizes the
    /// kind-specific progress fields of the response.
    ///
    /// # Arguments
    /// * `job_id` - The job identifier
    /// * `kind` - The job kind, selecting endpoint and field names
    ///
    /// # Errors
    /// * [`ClientError::MissingCredential`] / [`ClientError::Unauthorized`]
    ///   when no key is configured or the key is rejected
    /// * [`ClientError::NotFound`] when the backend does not know the job
    /// * anything else is transient; this method never retries
    pub async fn fetch_status(&self, job_id: &JobId, kind: JobKind) -> Result<StatusUpdate> {
        let api_key = self.api_key()?;
        let url = self.endpoint(&["jobs", kind.as_str(), job_id.as_str()])?;

        debug!("Fetching status of {} job {}", kind, job_id);

        let response = self
            .client
            .get(url)
            .bearer_auth(api_key.expose())
            .send()
            .await?;

        let body = self.handle_text_response(response).await?;

        StatusUpdate::parse(kind, &body)
            .map_err(|e| ClientError::ParseError(format!("Invalid status for job {}: {}", job_id, e)))
    }
}
