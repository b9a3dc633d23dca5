//! Webhook notification relay

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A message relayed to the configured webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// "info", "warning" or "error"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

/// Posts notifications to a webhook URL, when one is configured
#[derive(Clone)]
pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            webhook_url,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Send a notification. A missing webhook URL is a no-op, not an error.
    pub async fn send(&self, notification: &Notification) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            debug!("No webhook configured, dropping notification");
            return Ok(());
        };

        let response = self.client.post(url).json(notification).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Webhook error {}: {}", status, body);
        }

        debug!(title = %notification.title, "Notification sent");
        Ok(())
    }
}
