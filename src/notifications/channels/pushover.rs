//! Pushover notification channel

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::Notification;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Pushover message endpoint
pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Pushover application token and user key
#[derive(Debug, Clone)]
pub struct PushoverConfig {
    pub token: String,
    pub user: String,
    pub api_url: String,
}

impl PushoverConfig {
    pub fn new(token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user: user.into(),
            api_url: PUSHOVER_API_URL.to_string(),
        }
    }

    /// Point the channel at another endpoint
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

/// Sends notifications as Pushover messages (form POST)
pub struct PushoverChannel {
    config: PushoverConfig,
    client: Client,
    retry: RetryConfig,
}

impl PushoverChannel {
    pub fn new(config: PushoverConfig) -> ChannelResult<Self> {
        if config.token.trim().is_empty() || config.user.trim().is_empty() {
            return Err(ChannelError::InvalidConfig(
                "Pushover token and user are required".to_string(),
            ));
        }

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            config,
            client,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn post(&self, notification: &Notification) -> ChannelResult<()> {
        let message = notification.text();
        let form = [
            ("token", self.config.token.as_str()),
            ("user", self.config.user.as_str()),
            ("title", notification.kind.title()),
            ("message", message.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Channel for PushoverChannel {
    fn name(&self) -> &str {
        "pushover"
    }

    async fn send(&self, notification: &Notification) -> ChannelResult<DeliveryStatus> {
        match with_retry_if(&self.retry, || self.post(notification), ChannelError::is_retryable)
            .await
        {
            Ok(()) => {
                tracing::info!(account = %notification.account, "Pushover message delivered");
                Ok(DeliveryStatus::success(self.name()))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to deliver Pushover message");
                Ok(DeliveryStatus::failure(self.name(), e.to_string()))
            }
        }
    }
}
