//! Fan-out of notifications to every configured channel

use super::channels::{Channel, ChannelResult, DeliveryStatus};
use super::channels::pushover::{PushoverChannel, PushoverConfig};
use super::channels::webhook::{WebhookChannel, WebhookConfig};
use super::{Notification, Notifier};
use crate::config::NotificationSettings;
use async_trait::async_trait;
use futures::future::join_all;

/// Delivers each notification to all registered channels
#[derive(Default)]
pub struct NotificationManager {
    channels: Vec<Box<dyn Channel>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the channels named in the settings
    pub fn from_settings(settings: &NotificationSettings) -> ChannelResult<Self> {
        let mut manager = Self::new();

        if let Some(url) = &settings.webhook_url {
            let mut config = WebhookConfig::new(url.clone());
            if let Some(token) = &settings.webhook_token {
                config = config.with_auth_token(token.clone());
            }
            manager.add_channel(Box::new(WebhookChannel::new(config)?));
        }

        if let (Some(token), Some(user)) = (&settings.pushover_token, &settings.pushover_user) {
            let config = PushoverConfig::new(token.clone(), user.clone());
            manager.add_channel(Box::new(PushoverChannel::new(config)?));
        }

        Ok(manager)
    }

    pub fn add_channel(&mut self, channel: Box<dyn Channel>) {
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send to all channels concurrently and collect their statuses
    pub async fn deliver(&self, notification: &Notification) -> Vec<DeliveryStatus> {
        let sends = self.channels.iter().map(|channel| async move {
            match channel.send(notification).await {
                Ok(status) => status,
                Err(e) => DeliveryStatus::failure(channel.name(), e.to_string()),
            }
        });

        let statuses = join_all(sends).await;
        for status in statuses.iter().filter(|s| !s.success) {
            tracing::warn!(%status, "Notification not delivered");
        }
        statuses
    }
}

#[async_trait]
impl Notifier for NotificationManager {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            account = %notification.account,
            kind = %notification.kind,
            message = %notification.message,
            "Notification"
        );
        self.deliver(&notification).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::channels::ChannelError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingChannel {
        sent: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Channel for CountingChannel {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, _notification: &Notification) -> ChannelResult<DeliveryStatus> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ChannelError::InvalidConfig("broken".into()))
            } else {
                Ok(DeliveryStatus::success(self.name()))
            }
        }
    }

    #[test]
    fn test_from_settings() {
        let empty = NotificationManager::from_settings(&NotificationSettings::default()).unwrap();
        assert!(empty.channel_names().is_empty());

        let settings = NotificationSettings {
            webhook_url: Some("https://example.com/hook".into()),
            webhook_token: None,
            pushover_token: Some("tok".into()),
            pushover_user: Some("usr".into()),
        };
        let manager = NotificationManager::from_settings(&settings).unwrap();
        assert_eq!(manager.channel_names(), vec!["webhook", "pushover"]);
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let sent = Arc::new(AtomicUsize::new(0));
        let mut manager = NotificationManager::new();
        manager.add_channel(Box::new(CountingChannel {
            sent: Arc::clone(&sent),
            fail: true,
        }));
        manager.add_channel(Box::new(CountingChannel {
            sent: Arc::clone(&sent),
            fail: false,
        }));

        let statuses = manager
            .deliver(&Notification::booked("a@example.com", "done"))
            .await;

        assert_eq!(sent.load(Ordering::SeqCst), 2);
        assert_eq!(statuses.iter().filter(|s| s.success).count(), 1);
    }
}
