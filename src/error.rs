//! Error taxonomy shared by the source client, destination adapters and the
//! retry engine.

use thiserror::Error;

/// HTTP statuses that are worth retrying.
pub const RETRIABLE_STATUS_CODES: [u16; 4] = [500, 502, 503, 504];

#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection, timeout or body read failure
    #[error("Network error: {0}")]
    Transport(String),

    /// Non-success HTTP response
    #[error("{service} API error (status {status}): {message}")]
    Http {
        service: &'static str,
        status: u16,
        message: String,
        /// Machine-readable reasons parsed from the error body, if any
        reasons: Vec<String>,
    },

    /// A successful response that is missing something we need
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Upload target has been soft-deleted
    #[error("Destination {0} is in the trash")]
    Trashed(String),

    /// Operation is not available for this destination kind
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn http(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            service,
            status,
            message: message.into(),
            reasons: Vec::new(),
        }
    }

    /// Transport faults and 5xx gateway/server errors are retriable,
    /// everything else is fatal.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => RETRIABLE_STATUS_CODES.contains(status),
            _ => false,
        }
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        matches!(self, Self::Http { reasons, .. } if reasons.iter().any(|r| r == reason))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::http("HTTP", status.as_u16(), err.to_string()),
            None if err.is_decode() => Self::UnexpectedResponse(err.to_string()),
            None => Self::Transport(err.to_string()),
        }
    }
}
