// Notification channels: outbound webhooks, one per configured destination

use crate::config::NotificationsConfig;
use crate::models::{Alert, Severity};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("webhook returned status {0}")]
    Status(u16),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// One delivery destination. Implementations never retry; the notifier logs failures.
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;

    fn name(&self) -> &str;
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "#36a64f",
        Severity::Warning => "#ff9500",
        Severity::Critical => "#ff0000",
    }
}

fn severity_color_int(severity: Severity) -> u32 {
    match severity {
        Severity::Info => 0x36a64f,
        Severity::Warning => 0xff9500,
        Severity::Critical => 0xff0000,
    }
}

fn metric_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// POSTs `payload` and maps transport and HTTP failures to `NotifyError`.
async fn post_json(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    payload: &serde_json::Value,
) -> Result<(), NotifyError> {
    let response = client
        .post(url)
        .timeout(timeout)
        .json(payload)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                NotifyError::Timeout(timeout)
            } else {
                NotifyError::Request(e.to_string())
            }
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::Status(status.as_u16()));
    }
    Ok(())
}

pub struct SlackChannel {
    client: reqwest::Client,
    webhook_url: String,
    channel: Option<String>,
    timeout: Duration,
}

impl SlackChannel {
    pub fn new(
        client: reqwest::Client,
        webhook_url: String,
        channel: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            webhook_url,
            channel,
            timeout,
        }
    }

    fn payload(&self, alert: &Alert) -> serde_json::Value {
        let mut fields = vec![serde_json::json!({
            "title": "Severity",
            "value": alert.severity.as_str(),
            "short": true
        })];
        fields.extend(alert.metrics.iter().map(|(k, v)| {
            serde_json::json!({ "title": k, "value": metric_text(v), "short": true })
        }));
        serde_json::json!({
            "username": "Adopte Monitoring",
            "channel": self.channel,
            "attachments": [{
                "color": severity_color(alert.severity),
                "title": alert.title,
                "text": alert.description,
                "fields": fields,
                "footer": alert.kind.as_str(),
                "ts": alert.timestamp.timestamp()
            }]
        })
    }
}

#[async_trait::async_trait]
impl NotificationChannel for SlackChannel {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        post_json(
            &self.client,
            &self.webhook_url,
            self.timeout,
            &self.payload(alert),
        )
        .await
    }

    fn name(&self) -> &str {
        "slack"
    }
}

pub struct DiscordChannel {
    client: reqwest::Client,
    webhook_url: String,
    timeout: Duration,
}

impl DiscordChannel {
    pub fn new(client: reqwest::Client, webhook_url: String, timeout: Duration) -> Self {
        Self {
            client,
            webhook_url,
            timeout,
        }
    }

    fn payload(alert: &Alert) -> serde_json::Value {
        let fields: Vec<_> = alert
            .metrics
            .iter()
            .map(|(k, v)| serde_json::json!({ "name": k, "value": metric_text(v), "inline": true }))
            .collect();
        serde_json::json!({
            "embeds": [{
                "title": alert.title,
                "description": alert.description,
                "color": severity_color_int(alert.severity),
                "fields": fields,
                "footer": { "text": format!("{} / {}", alert.kind, alert.severity) },
                "timestamp": alert.timestamp.to_rfc3339()
            }]
        })
    }
}

#[async_trait::async_trait]
impl NotificationChannel for DiscordChannel {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        post_json(
            &self.client,
            &self.webhook_url,
            self.timeout,
            &Self::payload(alert),
        )
        .await
    }

    fn name(&self) -> &str {
        "discord"
    }
}

/// Generic JSON webhook: the alert itself is the body.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, url: String, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_value(alert).map_err(|e| NotifyError::Request(e.to_string()))?;
        post_json(&self.client, &self.url, self.timeout, &payload).await
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Builds a channel for every destination that has a URL. No URL, no channel.
pub fn channels_from_config(config: &NotificationsConfig) -> Vec<Arc<dyn NotificationChannel>> {
    let client = reqwest::Client::builder()
        .user_agent(crate::version::USER_AGENT)
        .build()
        .unwrap_or_default();
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    if let Some(url) = &config.slack_webhook_url {
        channels.push(Arc::new(SlackChannel::new(
            client.clone(),
            url.clone(),
            config.slack_channel.clone(),
            timeout,
        )));
    }
    if let Some(url) = &config.discord_webhook_url {
        channels.push(Arc::new(DiscordChannel::new(
            client.clone(),
            url.clone(),
            timeout,
        )));
    }
    if let Some(url) = &config.webhook_url {
        channels.push(Arc::new(WebhookChannel::new(client, url.clone(), timeout)));
    }
    channels
}
