//! slotwatch - appointment slot polling and booking engine
//!
//! Watches a consular appointment portal for slots earlier than the one an
//! account currently holds and books them, one independent loop per
//! account.
//!
//! # Architecture
//!
//! - [`config`] - Engine settings and per-account configuration
//! - [`portal`] - HTTP transport with browser-like headers and rate limiting
//! - [`parser`] - HTML extraction of tokens, applications and facilities
//! - [`session`] - Per-account login state and the re-login-once rule
//! - [`resolver`] - Schedule and facility id resolution
//! - [`poller`] - Available dates and times
//! - [`coupler`] - Secondary facility slot coupling and its cache
//! - [`booking`] - Booking submission and appointment snapshots
//! - [`scheduler`] - Tick policy, account loop and supervisor
//! - [`notifications`] - Outcome notifications
//!
//! # Example
//!
//! ```no_run
//! use slotwatch::config::{AccountConfig, Settings};
//! use slotwatch::notifications::LogNotifier;
//! use slotwatch::scheduler::Supervisor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let account = AccountConfig::load("accounts/alice.toml".as_ref())?;
//!
//!     let mut supervisor = Supervisor::new(settings, Arc::new(LogNotifier));
//!     supervisor.start(account)?;
//!     supervisor.join_all().await;
//!     Ok(())
//! }
//! ```

pub mod booking;
pub mod config;
pub mod coupler;
pub mod error;
pub mod models;
pub mod notifications;
pub mod parser;
pub mod poller;
pub mod portal;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{AccountConfig, Settings};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{AppointmentSnapshot, CandidateSlot, DateBounds, SecondarySlot};
    pub use crate::notifications::{Notification, NotificationManager, Notifier};
    pub use crate::scheduler::{AccountEngine, EngineEvent, EngineState, Supervisor};
    pub use crate::session::SessionManager;
}

pub use models::{AppointmentSnapshot, CandidateSlot, DateBounds, ResourceKind};
