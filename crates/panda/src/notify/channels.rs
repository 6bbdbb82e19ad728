use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use super::Notification;
use crate::config::{ChannelConfig, value_to_string};

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Notification channel trait
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Name used by `primary` and the per host/service `notifier` settings
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log
pub struct LogChannel;

#[async_trait::async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            host = %notification.host,
            return_code = %notification.return_code,
            "Notification: {}",
            notification.message
        );
        Ok(())
    }
}

/// POSTs notifications as JSON to a URL
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, url: url.into() })
    }
}

#[async_trait::async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| anyhow!("Webhook request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!("Webhook returned status code: {}", response.status().as_u16()));
        }

        Ok(())
    }
}

/// Build a channel from its config entry, unknown or broken entries are skipped
pub fn create_channel(config: &ChannelConfig) -> Option<Arc<dyn NotificationChannel>> {
    match config.channel_type.as_str() {
        "log" => Some(Arc::new(LogChannel)),
        "webhook" => {
            let Some(url) = config.args.get("url").map(value_to_string) else {
                warn!("Webhook notification channel has no url, skipping it");
                return None;
            };
            match WebhookChannel::new(url) {
                Ok(channel) => Some(Arc::new(channel)),
                Err(e) => {
                    warn!("Failed to create webhook notification channel: {}", e);
                    None
                }
            }
        }
        other => {
            warn!(channel = %other, "Unknown notification channel type, skipping it");
            None
        }
    }
}
