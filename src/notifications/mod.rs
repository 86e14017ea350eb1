//! Outcome notifications
//!
//! The engine reports exactly two things to people: a booking that moved
//! the appointment, and an account loop that stopped on a fatal condition.
//! Both go through the [`Notifier`] trait. [`NotificationManager`] fans a
//! notification out to every configured [`Channel`]; a channel that fails
//! is logged and never affects the engine.
//!
//! ```text
//!   AccountEngine ──► Notifier (NotificationManager)
//!                          │
//!                 ┌────────┴────────┐
//!                 ▼                 ▼
//!           ┌─────────┐       ┌──────────┐
//!           │ Webhook │       │ Pushover │
//!           └─────────┘       └──────────┘
//! ```

pub mod channels;
mod manager;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use channels::pushover::{PushoverChannel, PushoverConfig};
pub use channels::webhook::{WebhookChannel, WebhookConfig};
pub use channels::{Channel, ChannelError, DeliveryStatus};
pub use manager::NotificationManager;

/// What a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A booking changed the account's appointment
    Booked,
    /// The account loop stopped on a fatal condition
    Stopped,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::Stopped => "stopped",
        }
    }

    /// Short title used by channels that show one
    pub fn title(&self) -> &'static str {
        match self {
            Self::Booked => "Appointment rescheduled",
            Self::Stopped => "Slot watch stopped",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A terminal outcome of one account loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    /// Account the outcome belongs to
    pub account: String,
    /// Human-readable outcome
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, account: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            account: account.into(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn booked(account: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Booked, account, message)
    }

    pub fn stopped(account: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Stopped, account, message)
    }

    /// One-line text for channels that only carry a message body
    pub fn text(&self) -> String {
        format!("[{}] {}", self.account, self.message)
    }
}

/// Sink for terminal outcomes
///
/// Infallible from the caller's side: implementations log their own
/// delivery failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            account = %notification.account,
            kind = %notification.kind,
            message = %notification.message,
            "Notification"
        );
    }
}
