//! Error types for the portal transport and page parsing
//!
//! This module defines the low-level error types raised while talking to the
//! remote scheduling site and while scraping its pages.

use thiserror::Error;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote site rejected the session (401 or bounce to sign-in)
    #[error("Authorization rejected (status {0})")]
    Unauthorized(u16),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Response body could not be decoded as expected
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Map a non-success HTTP status to the matching error
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized(status),
            429 => Self::RateLimit,
            _ => Self::ServerError(status),
        }
    }

    /// Check if this is an authorization-class failure
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Transport failures worth another attempt on the next tick
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimit | Self::Decode(_) => true,
            Self::ServerError(status) => *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Unauthorized(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Errors that can occur while scraping portal pages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No `<meta name="csrf-token">` on the page
    #[error("CSRF token not found in page")]
    CsrfTokenNotFound,

    /// Response did not set the session cookie
    #[error("Session cookie missing from response")]
    SessionCookieMissing,

    /// A `<select>` element with the given id was not found
    #[error("Select element not found: {0}")]
    SelectNotFound(String),

    /// Dashboard does not list the bound schedule id
    #[error("Application {0} not found on dashboard")]
    ApplicationNotFound(String),

    /// Date string did not match the expected format
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Time string did not match the expected format
    #[error("Invalid time: {0}")]
    InvalidTime(String),
}
