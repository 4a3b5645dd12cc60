//! Error types for GrabKit

use thiserror::Error;

/// Caller-facing operation an error is reported for.
///
/// The same failure reads slightly differently depending on whether a
/// conversion or a download was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Convert a resource to text, markdown, HTML or JSON
    Convert,
    /// Probe or stream a resource for download
    Download,
}

/// Errors that can occur during fetch, convert and download operations
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL is missing
    #[error("Missing required parameter: url")]
    MissingUrl,

    /// URL did not parse as an absolute http(s) URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// DNS or connection-level failure
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    /// Upstream answered with a non-success status
    #[error("HTTP {status}: {status_text}")]
    UpstreamHttp { status: u16, status_text: String },

    /// Deadline exceeded while connecting or transferring
    #[error("Request timed out")]
    Timeout,

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Create an error from a reqwest error
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Unreachable(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::UpstreamHttp {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            }
        } else {
            FetchError::Internal(err.to_string())
        }
    }

    /// Status code reported to the caller
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::MissingUrl | FetchError::InvalidUrl(_) | FetchError::Unreachable(_) => 400,
            FetchError::UpstreamHttp { status, .. } => *status,
            FetchError::Timeout | FetchError::Internal(_) => 500,
        }
    }

    /// Message safe to hand to the caller.
    ///
    /// Transport detail carried by `Unreachable` and `Internal` is kept for
    /// logs only.
    pub fn public_message(&self, operation: Operation) -> String {
        match self {
            FetchError::MissingUrl => "URL is required".to_string(),
            FetchError::InvalidUrl(_) => "Invalid URL format".to_string(),
            FetchError::Unreachable(_) => match operation {
                Operation::Convert => "Invalid URL or website not accessible".to_string(),
                Operation::Download => "Invalid URL or resource not accessible".to_string(),
            },
            FetchError::UpstreamHttp {
                status,
                status_text,
            } => format!("HTTP {}: {}", status, status_text),
            FetchError::Timeout | FetchError::Internal(_) => match operation {
                Operation::Convert => "Failed to fetch content from URL".to_string(),
                Operation::Download => "Failed to process download request".to_string(),
            },
        }
    }
}
