//! Synchronized job state
//!
//! [`SyncState`] is the client-side view of one tracked job. It is owned and
//! mutated by the synchronization controller only; subscribers receive owned
//! clones of it.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use super::job::{JobId, JobKind, JobStatus, Progress};

/// Transport currently feeding updates for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stream,
    Poll,
    Unattached,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stream => write!(f, "stream"),
            Transport::Poll => write!(f, "poll"),
            Transport::Unattached => write!(f, "unattached"),
        }
    }
}

/// Why a job could no longer be observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// The credential was missing or rejected
    Unauthorized,
    /// The backend does not know the job id
    NotFound,
}

/// A synchronization failure
///
/// Distinct from a job that reports `failed`: this means the client lost the
/// ability to observe the job, not that the job itself went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    pub kind: SyncErrorKind,
    pub message: String,
}

impl SyncError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            kind: SyncErrorKind::Unauthorized,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SyncErrorKind::NotFound,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SyncErrorKind::Unauthorized => write!(f, "unauthorized: {}", self.message),
            SyncErrorKind::NotFound => write!(f, "not found: {}", self.message),
        }
    }
}

/// Client-side state of a tracked job
///
/// Serializes with a derived `is_terminal` field next to the stored ones.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncState {
    pub job_id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: Progress,
    pub transport: Transport,
    /// Set when the job can no longer be observed
    pub last_error: Option<SyncError>,
    /// Error message reported by the backend for the job itself
    pub job_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    /// Fresh state for a job that has not been queried yet
    pub fn new(job_id: JobId, kind: JobKind) -> Self {
        Self {
            job_id,
            kind,
            status: JobStatus::Pending,
            progress: Progress::default(),
            transport: Transport::Unattached,
            last_error: None,
            job_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether synchronization for this job has ended
    ///
    /// True once the job reached a terminal status, and also once it can no
    /// longer be observed. In the latter case `status` keeps the last value
    /// seen and `last_error` says why.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() || self.last_error.is_some()
    }

    /// Record a synchronization failure and detach from any transport
    ///
    /// A job the backend does not know is reported as failed with a
    /// synthetic reason since no further update can ever arrive for it.
    pub fn record_sync_error(&mut self, error: SyncError) {
        if error.kind == SyncErrorKind::NotFound && !self.is_terminal() {
            self.status = JobStatus::Failed;
            self.job_error = Some(format!("job {} not found", self.job_id));
        }
        self.last_error = Some(error);
        self.transport = Transport::Unattached;
        self.touch();
    }

    /// Compare everything a subscriber can observe except the timestamp
    pub fn same_content(&self, other: &SyncState) -> bool {
        self.job_id == other.job_id
            && self.kind == other.kind
            && self.status == other.status
            && self.progress == other.progress
            && self.transport == other.transport
            && self.last_error == other.last_error
            && self.job_error == other.job_error
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Serialize for SyncState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SyncState", 9)?;
        state.serialize_field("job_id", &self.job_id)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("progress", &self.progress)?;
        state.serialize_field("transport", &self.transport)?;
        state.serialize_field("last_error", &self.last_error)?;
        state.serialize_field("job_error", &self.job_error)?;
        state.serialize_field("updated_at", &self.updated_at)?;
        state.serialize_field("is_terminal", &self.is_terminal())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SyncState {
        SyncState::new(JobId::new("job-1").unwrap(), JobKind::Crawl)
    }

    #[test]
    fn test_new_state_is_pending_and_unattached() {
        let state = state();
        assert_eq!(state.status, JobStatus::Pending);
        assert_eq!(state.transport, Transport::Unattached);
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_not_found_marks_failed_and_final() {
        let mut state = state();
        state.record_sync_error(SyncError::not_found("no such job"));
        assert_eq!(state.status, JobStatus::Failed);
        assert!(state.is_terminal());
        assert!(state.job_error.is_some());
    }

    #[test]
    fn test_unauthorized_keeps_last_known_status_and_is_terminal() {
        let mut state = state();
        state.status = JobStatus::Running;
        state.transport = Transport::Poll;
        state.record_sync_error(SyncError::unauthorized("token rejected"));
        assert_eq!(state.status, JobStatus::Running);
        assert!(!state.status.is_terminal());
        assert!(state.is_terminal());
        assert_eq!(state.transport, Transport::Unattached);
    }

    #[test]
    fn test_serialized_snapshot_carries_terminal_flag() {
        let mut state = state();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["is_terminal"], false);
        assert_eq!(json["status"], "pending");

        state.record_sync_error(SyncError::unauthorized("token rejected"));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["is_terminal"], true);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["last_error"]["kind"], "unauthorized");

        let back: SyncState = serde_json::from_value(json).unwrap();
        assert!(back.same_content(&state));
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let a = state();
        let mut b = a.clone();
        b.updated_at = a.updated_at + chrono::Duration::seconds(5);
        assert!(a.same_content(&b));
        b.transport = Transport::Poll;
        assert!(!a.same_content(&b));
    }
}
