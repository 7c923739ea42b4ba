//! Job status messages
//!
//! Both the status endpoint and the event stream send a JSON object with a
//! `status` field and a pair of progress counters. The counter names depend
//! on the job kind (`completed_pages` for crawls, `completed_urls` for
//! batches, ...), so messages are parsed from a `serde_json::Value` against
//! the kind's field names, falling back to the generic names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::job::{JobKind, JobStatus};

const GENERIC_COMPLETED: [&str; 3] = ["completed_units", "completedUnits", "completed"];
const GENERIC_TOTAL: [&str; 3] = ["total_units", "totalUnits", "total"];

/// A single status observation for a job, independent of transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: JobStatus,
    /// Completed units, if the message carried a usable number
    pub completed: Option<u64>,
    /// Total units, if the message carried a usable number
    pub total: Option<u64>,
    /// Backend-reported error for the job
    pub error: Option<String>,
    /// Set on the last message the server sends on a stream
    #[serde(default)]
    pub done: bool,
}

/// Errors raised while parsing a status message
#[derive(Debug, Error)]
pub enum UpdateParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("status message is not a JSON object")]
    NotAnObject,

    #[error("status message has no status field")]
    MissingStatus,

    #[error("unknown job status '{0}'")]
    UnknownStatus(String),
}

impl StatusUpdate {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            completed: None,
            total: None,
            error: None,
            done: false,
        }
    }

    pub fn with_progress(mut self, completed: u64, total: u64) -> Self {
        self.completed = Some(completed);
        self.total = Some(total);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Parse a raw JSON message for a job of the given kind
    pub fn parse(kind: JobKind, raw: &str) -> Result<Self, UpdateParseError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(kind, &value)
    }

    /// Normalize an already-decoded JSON message
    pub fn from_value(kind: JobKind, value: &Value) -> Result<Self, UpdateParseError> {
        let object = value.as_object().ok_or(UpdateParseError::NotAnObject)?;

        let status = match object.get("status") {
            Some(Value::String(s)) => parse_status(s)?,
            Some(other) => return Err(UpdateParseError::UnknownStatus(other.to_string())),
            None => return Err(UpdateParseError::MissingStatus),
        };

        let (completed_field, total_field) = kind.progress_fields();
        let completed = lookup_count(object, completed_field, &GENERIC_COMPLETED);
        let total = lookup_count(object, total_field, &GENERIC_TOTAL);

        let error = match object.get("error") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        };

        let done = matches!(object.get("done"), Some(Value::Bool(true)));

        Ok(Self {
            status,
            completed,
            total,
            error,
            done,
        })
    }
}

fn parse_status(raw: &str) -> Result<JobStatus, UpdateParseError> {
    let lowered = raw.trim().to_ascii_lowercase();
    serde_json::from_value(Value::String(lowered))
        .map_err(|_| UpdateParseError::UnknownStatus(raw.to_string()))
}

/// Find the first usable counter among the kind-specific and generic names
fn lookup_count(object: &Map<String, Value>, specific: &str, generic: &[&str]) -> Option<u64> {
    std::iter::once(specific)
        .chain(generic.iter().copied())
        .filter_map(|field| object.get(field))
        .find_map(as_count)
}

fn as_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    // Some endpoints serialize counters as floats
    value
        .as_f64()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as u64)
}
