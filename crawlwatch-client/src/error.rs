//! Error types for the crawlwatch client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the crawlwatch client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (connection refused, timeout, reset, ...)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The base URL cannot carry job paths
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    /// No API key was configured
    #[error("No API key configured")]
    MissingCredential,

    /// The API key was rejected (401/403)
    #[error("Unauthorized (status {status}): {message}")]
    Unauthorized {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Job not known to the backend
    #[error("Job not found: {0}")]
    NotFound(String),

    /// API returned another error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// The event stream broke while reading
    #[error("Event stream error: {0}")]
    StreamError(String),
}

impl ClientError {
    /// Create an error from a non-success status code and response body
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized { status, message },
            404 => Self::NotFound(message),
            _ => Self::ApiError { status, message },
        }
    }

    /// Check if the credential was missing or rejected
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::Unauthorized { .. })
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if retrying later could succeed
    ///
    /// Everything except auth and not-found failures is transient: network
    /// errors, server errors and unparsable bodies alike.
    pub fn is_transient(&self) -> bool {
        !self.is_auth() && !self.is_not_found()
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(ClientError::from_status(401, "bad token").is_auth());
        assert!(ClientError::from_status(403, "forbidden").is_auth());
        assert!(ClientError::from_status(404, "gone").is_not_found());

        let server = ClientError::from_status(503, "busy");
        assert!(server.is_server_error());
        assert!(server.is_transient());
    }

    #[test]
    fn test_missing_credential_is_auth() {
        assert!(ClientError::MissingCredential.is_auth());
        assert!(!ClientError::MissingCredential.is_transient());
    }

    #[test]
    fn test_parse_error_is_transient() {
        assert!(ClientError::ParseError("eof".into()).is_transient());
    }
}
