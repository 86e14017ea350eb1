//! Webhook notification channel
//!
//! Posts each notification as JSON, optionally with a bearer token.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::Notification;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Webhook URL cannot be empty".to_string());
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Sends notifications as JSON via HTTP POST
///
/// ```json
/// {
///   "id": "notification-uuid",
///   "kind": "booked",
///   "account": "alice@example.com",
///   "message": "Rescheduled from 09:00 2025-06-01 to 08:15 2025-03-10",
///   "created_at": "2025-01-01T12:00:00Z"
/// }
/// ```
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
    retry: RetryConfig,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let retry = RetryConfig::new(config.max_retries);

        Ok(Self {
            config,
            client,
            retry,
        })
    }

    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    /// Override the backoff between attempts
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_payload(&self, notification: &Notification) -> serde_json::Value {
        serde_json::json!({
            "id": notification.id,
            "kind": notification.kind.as_str(),
            "title": notification.kind.title(),
            "account": notification.account,
            "message": notification.message,
            "created_at": notification.created_at.to_rfc3339(),
        })
    }

    async fn post(&self, payload: &serde_json::Value) -> ChannelResult<()> {
        let mut request = self.client.post(&self.config.url);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
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
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> ChannelResult<DeliveryStatus> {
        let payload = self.build_payload(notification);

        match with_retry_if(&self.retry, || self.post(&payload), ChannelError::is_retryable).await {
            Ok(()) => {
                tracing::info!(url = %self.config.url, "Webhook delivered");
                Ok(DeliveryStatus::success(self.name()))
            }
            Err(e) => {
                tracing::error!(url = %self.config.url, error = %e, "Failed to deliver webhook");
                Ok(DeliveryStatus::failure(self.name(), e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_webhook_config_validation() {
        assert!(WebhookConfig::new("https://example.com/webhook").validate().is_ok());
        assert!(WebhookConfig::new("").validate().is_err());
        assert!(WebhookConfig::new("example.com/webhook").validate().is_err());
        assert!(WebhookConfig::new("https://example.com")
            .with_timeout(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_payload_building() {
        let channel = WebhookChannel::from_url("https://example.com/webhook").unwrap();
        let payload = channel.build_payload(&Notification::booked("a@example.com", "done"));

        assert_eq!(payload["kind"], "booked");
        assert_eq!(payload["account"], "a@example.com");
        assert_eq!(payload["message"], "done");
        assert!(payload["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_delivers_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = WebhookConfig::new(format!("{}/hook", server.uri())).with_auth_token("secret");
        let channel = WebhookChannel::new(config).unwrap();

        let status = channel
            .send(&Notification::stopped("a@example.com", "fatal"))
            .await
            .unwrap();
        assert!(status.success);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::from_url(format!("{}/hook", server.uri()))
            .unwrap()
            .with_retry(RetryConfig::with_delays(3, 1, 5));

        let status = channel
            .send(&Notification::booked("a@example.com", "done"))
            .await
            .unwrap();
        assert!(!status.success);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let channel = WebhookChannel::from_url(format!("{}/hook", server.uri()))
            .unwrap()
            .with_retry(RetryConfig::with_delays(2, 1, 5));

        let status = channel
            .send(&Notification::booked("a@example.com", "done"))
            .await
            .unwrap();
        assert!(!status.success);
    }
}
