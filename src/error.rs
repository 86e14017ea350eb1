//! Unified error handling for the slotwatch crate
//!
//! This module provides a unified error type that consolidates all
//! domain-specific errors into a single `Error` enum. The scheduler loop
//! classifies every failure through [`Error::is_fatal`] and
//! [`Error::is_recoverable`]: fatal errors stop the account loop, everything
//! else abandons the current tick and waits for the next one.
//!
//! # Usage
//!
//! ```rust,ignore
//! use slotwatch::error::{Error, ErrorCategory};
//!
//! fn handle_error(err: Error) {
//!     if err.is_fatal() {
//!         eprintln!("Stopping: {err}");
//!     } else {
//!         println!("Next tick ({}): {err}", err.category());
//!     }
//! }
//! ```

use chrono::NaiveDate;
use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::notifications::channels::ChannelError;
pub use crate::resolver::ResolveError;
pub use crate::utils::error::{FetchError, ParseError};

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Session rejected by the remote site
    Auth,
    /// Parsing and data extraction errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Schedule or facility id could not be determined
    Resolution,
    /// The account's booking state rules out further work
    Booking,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Resolution => "resolution",
            Self::Booking => "booking",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for the slotwatch crate
#[derive(Error, Debug)]
pub enum Error {
    /// Transport errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Page scraping errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Resource id resolution errors
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// The session was rejected again right after a fresh login
    #[error("Authorization expired again after re-login")]
    AuthorizationExpired,

    /// The booked appointment is already at or before the configured floor
    #[error("Current appointment date {current} is not after minimal date {min}")]
    BelowMinimumDate { current: NaiveDate, min: NaiveDate },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse errors
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other(context.into())
    }

    /// The remote site rejected the session for this call
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_unauthorized())
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) if e.is_unauthorized() => ErrorCategory::Auth,
            Self::Fetch(_) => ErrorCategory::Network,
            Self::AuthorizationExpired => ErrorCategory::Auth,
            Self::Parse(_) | Self::Json(_) => ErrorCategory::Parsing,
            Self::Resolve(_) => ErrorCategory::Resolution,
            Self::BelowMinimumDate { .. } => ErrorCategory::Booking,
            Self::Io(_) => ErrorCategory::Storage,
            Self::TomlDe(_) | Self::TomlSer(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Check if the next tick is likely to succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_transient() || e.is_unauthorized(),
            Self::AuthorizationExpired => true,
            Self::Parse(_) => true, // maintenance pages, partial responses
            Self::Json(_) => true,  // malformed JSON is treated as transient
            Self::Io(_) => true,
            Self::Resolve(_) => false,
            Self::BelowMinimumDate { .. } => false,
            Self::TomlDe(_) | Self::TomlSer(_) | Self::Config(_) => false,
            Self::Other(_) => false,
        }
    }

    /// Conditions that terminate the account loop instead of waiting for
    /// the next tick
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Resolve(_)
                | Self::BelowMinimumDate { .. }
                | Self::Config(_)
                | Self::TomlDe(_)
                | Self::TomlSer(_)
        )
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceKind;

    #[test]
    fn test_error_category() {
        let fetch_err = Error::Fetch(FetchError::Timeout);
        assert_eq!(fetch_err.category(), ErrorCategory::Network);

        let auth_err = Error::Fetch(FetchError::Unauthorized(401));
        assert_eq!(auth_err.category(), ErrorCategory::Auth);

        let parse_err = Error::Parse(ParseError::CsrfTokenNotFound);
        assert_eq!(parse_err.category(), ErrorCategory::Parsing);
    }

    #[test]
    fn test_transient_errors_are_not_fatal() {
        for err in [
            Error::Fetch(FetchError::Timeout),
            Error::Fetch(FetchError::ServerError(503)),
            Error::AuthorizationExpired,
            Error::Parse(ParseError::CsrfTokenNotFound),
        ] {
            assert!(!err.is_fatal(), "{err} should not be fatal");
            assert!(err.is_recoverable(), "{err} should be recoverable");
        }
    }

    #[test]
    fn test_fatal_errors() {
        let below = Error::BelowMinimumDate {
            current: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            min: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
        };
        assert!(below.is_fatal());
        assert_eq!(below.category(), ErrorCategory::Booking);

        let resolve = Error::Resolve(ResolveError::NoCandidates {
            kind: ResourceKind::Primary,
        });
        assert!(resolve.is_fatal());
        assert!(!resolve.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("email is required");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(!err.is_fatal());
    }
}
