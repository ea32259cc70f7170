//! Error types for media providers
//!
//! This module defines the errors a provider call can end in, plus the
//! lower-level HTTP fetch errors that providers translate from.

use thiserror::Error;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Client error with status code (4xx other than 404/429)
    #[error("Client error: {0}")]
    ClientError(u16),

    /// Resource not found (HTTP 404)
    #[error("Not found")]
    NotFound,

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Classify an HTTP status code that is not a success
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 410 => Self::NotFound,
            429 => Self::RateLimit,
            500..=599 => Self::ServerError(status),
            _ => Self::ClientError(status),
        }
    }
}

/// Outcome of a failed provider call
///
/// `NoResults` is a normal answer ("nothing matched"), not an
/// infrastructure problem. Only `Unavailable` and `Timeout` are transient
/// and count toward a provider's circuit breaker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The query matched nothing
    #[error("No results")]
    NoResults,

    /// Transport, auth or parsing failure
    #[error("Provider unavailable: {reason}")]
    Unavailable { reason: String },

    /// Circuit breaker is open, provider was not invoked
    #[error("Circuit open")]
    CircuitOpen,

    /// Provider switched off by an administrator
    #[error("Provider disabled")]
    Disabled,

    /// Per-call or overall deadline exceeded
    #[error("Timed out")]
    Timeout,

    /// Provider cannot serve the request shape (e.g. a query filter)
    #[error("Unsupported request: {reason}")]
    Unsupported { reason: String },

    /// No provider is registered under the requested id
    #[error("Unknown provider '{id}'")]
    UnknownProvider { id: String },
}

impl ProviderError {
    /// Create an `Unavailable` error from anything printable
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create an `Unsupported` error
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    /// Whether a retry within the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout)
    }

    /// Whether this failure is charged to the circuit breaker
    pub fn counts_toward_breaker(&self) -> bool {
        self.is_transient()
    }

    /// Short machine-friendly label, used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoResults => "no_results",
            Self::Unavailable { .. } => "unavailable",
            Self::CircuitOpen => "circuit_open",
            Self::Disabled => "disabled",
            Self::Timeout => "timeout",
            Self::Unsupported { .. } => "unsupported",
            Self::UnknownProvider { .. } => "unknown_provider",
        }
    }

    /// The request itself cannot be served, whatever the providers' health
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Unsupported { .. } | Self::UnknownProvider { .. })
    }
}

impl From<FetchError> for ProviderError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound => Self::NoResults,
            FetchError::Timeout => Self::Timeout,
            FetchError::Http(e) if e.is_timeout() => Self::Timeout,
            other => Self::unavailable(other.to_string()),
        }
    }
}
