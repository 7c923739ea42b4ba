//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque job identifier assigned by the backend
///
/// Never empty, and never `.` or `..`, which cannot stand as a single URL
/// path segment. Otherwise opaque; the client percent-encodes it whenever
/// it becomes part of an endpoint path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

/// Error returned when constructing a [`JobId`] from unusable input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job id cannot be empty, \".\" or \"..\"")]
pub struct InvalidJobId;

impl JobId {
    /// Create a job id, rejecting empty, whitespace-only and dot-segment input
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidJobId> {
        let id = id.into();
        if id.trim().is_empty() || id == "." || id == ".." {
            return Err(InvalidJobId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = InvalidJobId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Kind of backend job
///
/// Determines the status endpoint and the field names the backend uses to
/// report progress. Immutable for the lifetime of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Scrape,
    Crawl,
    Map,
    Batch,
    Search,
}

/// Error returned when parsing an unknown job kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job kind '{0}' (expected scrape, crawl, map, batch or search)")]
pub struct ParseKindError(pub String);

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::Scrape,
        JobKind::Crawl,
        JobKind::Map,
        JobKind::Batch,
        JobKind::Search,
    ];

    /// Path segment used by the status endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Scrape => "scrape",
            JobKind::Crawl => "crawl",
            JobKind::Map => "map",
            JobKind::Batch => "batch",
            JobKind::Search => "search",
        }
    }

    /// Kind-specific `(completed, total)` progress field names
    ///
    /// Page-oriented jobs count pages, batches count submitted URLs and
    /// searches count results.
    pub fn progress_fields(&self) -> (&'static str, &'static str) {
        match self {
            JobKind::Scrape | JobKind::Crawl | JobKind::Map => ("completed_pages", "total_pages"),
            JobKind::Batch => ("completed_urls", "total_urls"),
            JobKind::Search => ("completed_results", "total_results"),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// Job status as reported by the backend
///
/// `Started` and `Running` are the same logical state; some endpoints emit
/// one and some the other. Use [`JobStatus::normalized`] before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Collapse backend synonyms into a single representative
    pub fn normalized(self) -> Self {
        match self {
            JobStatus::Started => JobStatus::Running,
            other => other,
        }
    }

    /// Whether no further progress is possible from this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Started => "started",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a job in backend-defined units
///
/// A `total` of zero means the target is not known yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }

    pub fn is_total_known(&self) -> bool {
        self.total > 0
    }

    /// Completion ratio in `[0, 1]`, if the total is known
    pub fn fraction(&self) -> Option<f64> {
        if !self.is_total_known() {
            return None;
        }
        Some((self.completed as f64 / self.total as f64).min(1.0))
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_total_known() {
            write!(f, "{}/{}", self.completed, self.total)
        } else {
            write!(f, "{}/?", self.completed)
        }
    }
}
