//! Error types for the platform client

use std::time::Duration;

/// Errors raised by platform API calls.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Host name could not be resolved
    #[error("DNS resolution failed: {0}")]
    Dns(String),
    /// Transient server-side failure; the call should be retried
    #[error("platform returned {status}: {body}")]
    Retry {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },
    /// Retry budget exhausted
    #[error("gave up after {elapsed:?}: {last}")]
    Timeout {
        /// Time spent retrying
        elapsed: Duration,
        /// Last error observed
        last: Box<PlatformError>,
    },
    /// Non-retryable HTTP failure
    #[error("platform returned {status}: {body}")]
    Http {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },
    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Transport-level failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response body could not be decoded
    #[error("could not decode response from {url}: {reason}")]
    Decode {
        /// Request URL
        url: String,
        /// Decoder message
        reason: String,
    },
    /// Invalid URL
    #[error("invalid url {0}")]
    InvalidUrl(String),
    /// HTTP client or token could not be built; permanent for this client
    #[error("platform client unavailable: {0}")]
    ClientConstruction(String),
    /// Cancellation was requested
    #[error("cancelled")]
    Cancelled,
}

impl PlatformError {
    /// DNS failures and the retry sentinel are retried; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlatformError::Dns(_) | PlatformError::Retry { .. })
    }

    /// Returns true for 404 responses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }

    /// Classifies a transport error, separating DNS failures from the rest.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(e) = source {
            let msg = e.to_string();
            if msg.contains("dns error") || msg.contains("failed to lookup address") {
                return PlatformError::Dns(msg);
            }
            source = e.source();
        }
        PlatformError::Request(err)
    }

    /// Maps a non-success status to the retry sentinel (5xx), `NotFound` (404)
    /// or a plain HTTP error.
    pub fn from_status(status: u16, url: &str, body: String) -> Self {
        match status {
            500..=599 => PlatformError::Retry { status, body },
            404 => PlatformError::NotFound(url.to_string()),
            _ => PlatformError::Http { status, body },
        }
    }
}

/// Result alias for the platform client.
pub type Result<T> = std::result::Result<T, PlatformError>;
