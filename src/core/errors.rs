//! Custom error types for blessing generation

use thiserror::Error;

/// Errors raised while talking to a completion provider
#[derive(Error, Debug)]
pub enum CompletionError {
    /// No provider tier has an API key
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
    },

    /// Provider answered with a non-2xx status
    #[error("API error: {status} - {}", provider_message.as_deref().unwrap_or("no message"))]
    Api {
        status: u16,
        /// `error.message` from the provider body, kept for logs only
        provider_message: Option<String>,
    },

    /// Connection-level failure
    #[error("Network error: {message}")]
    Network {
        message: String,
    },

    /// Request exceeded the configured timeout
    #[error("Request timeout")]
    Timeout,

    /// Provider answered 2xx but the body was not a usable completion
    #[error("Invalid response: {message}")]
    InvalidResponse {
        message: String,
    },
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout
        } else if err.is_decode() {
            CompletionError::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            CompletionError::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Input rejected before any prompt is built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// User-facing message
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Counter store failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store could not be reached or answered with an error
    #[error("Counter store unavailable: {message}")]
    Unavailable {
        message: String,
    },

    /// Store answered with something other than a counter
    #[error("Unexpected store response: {message}")]
    UnexpectedResponse {
        message: String,
    },
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Unavailable {
            message: err.to_string(),
        }
    }
}

/// Admission gate failures
#[derive(Error, Debug)]
pub enum GateError {
    /// Backing store failed and the gate runs in strict mode
    #[error("Rate limiter store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Result type for completion operations
pub type Result<T> = std::result::Result<T, CompletionError>;
