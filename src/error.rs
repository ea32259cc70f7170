//! Unified error handling for the media-roulette crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`RouletteErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Spins themselves never fail with these errors: provider failures are
//! folded into [`crate::models::Outcome`]. `Error` covers setup paths such
//! as configuration loading and provider construction.

use std::io;
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::utils::error::{FetchError, ProviderError};

/// Common trait for all media-roulette error types
pub trait RouletteErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Short message suitable for showing to an end user
    fn user_message(&self) -> String;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// A provider answered but had nothing usable
    NoMedia,
    /// Policy exclusions: disabled providers, open circuits, unsupported requests
    Policy,
    /// Parsing and data extraction errors
    Parsing,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::NoMedia => "no_media",
            Self::Policy => "policy",
            Self::Parsing => "parsing",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl RouletteErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimit | Self::ServerError(_) | Self::Timeout
        )
    }

    fn user_message(&self) -> String {
        match self {
            Self::NotFound => "Nothing was found at the source".to_string(),
            Self::RateLimit => "The source is rate limiting requests, try again shortly".to_string(),
            _ => "The source could not be reached".to_string(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Decode(_) => ErrorCategory::Parsing,
            Self::NotFound => ErrorCategory::NoMedia,
            Self::InvalidUrl(_) => ErrorCategory::Config,
            _ => ErrorCategory::Network,
        }
    }
}

impl RouletteErrorTrait for ProviderError {
    fn is_recoverable(&self) -> bool {
        self.is_transient()
    }

    fn user_message(&self) -> String {
        match self {
            Self::NoResults => "No media found for that request".to_string(),
            Self::Unavailable { .. } | Self::Timeout | Self::CircuitOpen => {
                "That source is temporarily unavailable".to_string()
            }
            Self::Disabled => "That source is disabled".to_string(),
            Self::Unsupported { .. } => "That source does not support this request".to_string(),
            Self::UnknownProvider { id } => format!("There is no source called '{id}'"),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NoResults => ErrorCategory::NoMedia,
            Self::Unavailable { .. } | Self::Timeout => ErrorCategory::Network,
            Self::CircuitOpen
            | Self::Disabled
            | Self::Unsupported { .. }
            | Self::UnknownProvider { .. } => ErrorCategory::Policy,
        }
    }
}

/// Unified error type for the media-roulette crate
#[derive(Error, Debug)]
pub enum Error {
    /// Provider call errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Configuration loading and validation errors
    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors found while wiring components
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RouletteErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_recoverable(),
            Self::Fetch(e) => e.is_recoverable(),
            Self::ConfigFile(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Provider(e) => e.user_message(),
            Self::Fetch(e) => e.user_message(),
            Self::ConfigFile(_) | Self::Config(_) => "The bot is misconfigured".to_string(),
            Self::Io(_) | Self::Json(_) | Self::Http(_) | Self::Other { .. } => {
                "Something went wrong, try again later".to_string()
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(e) => e.category(),
            Self::Fetch(e) => e.category(),
            Self::Http(_) => ErrorCategory::Network,
            Self::ConfigFile(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Io(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let fetch_err = Error::Fetch(FetchError::Timeout);
        assert_eq!(fetch_err.category(), ErrorCategory::Network);

        let provider_err = Error::Provider(ProviderError::CircuitOpen);
        assert_eq!(provider_err.category(), ErrorCategory::Policy);

        let no_media = Error::Provider(ProviderError::NoResults);
        assert_eq!(no_media.category(), ErrorCategory::NoMedia);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Fetch(FetchError::Timeout).is_recoverable());
        assert!(Error::Provider(ProviderError::unavailable("503")).is_recoverable());
        assert!(!Error::Provider(ProviderError::NoResults).is_recoverable());
        assert!(!Error::Fetch(FetchError::NotFound).is_recoverable());
    }

    #[test]
    fn test_user_message_distinguishes_no_media_from_outage() {
        assert_ne!(
            ProviderError::NoResults.user_message(),
            ProviderError::Timeout.user_message()
        );
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing inner provider");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());

        let err: Error = ConfigError::Invalid("fan_out".into()).into();
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
    }
}
