use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::models::CheckoutOutcome;
use crate::plugins::traits::{Notification, NotificationResult, NotificationSink};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub mention_role: Option<String>,
    pub mention_user: Option<String>,
}

impl DiscordConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.webhook_url.trim().is_empty() {
            return Err("Missing webhook_url".to_string());
        }

        let url = Url::parse(&self.webhook_url)
            .map_err(|e| format!("Invalid Discord webhook URL: {}", e))?;
        if !url.path().contains("/api/webhooks/") {
            return Err("Invalid Discord webhook URL format".to_string());
        }
        Ok(())
    }
}

pub struct DiscordNotifier {
    client: Client,
    config: DiscordConfig,
}

impl DiscordNotifier {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        config.validate().map_err(|e| AppError::Notification {
            sink: "discord".to_string(),
            message: e,
        })?;

        Ok(DiscordNotifier {
            client: Client::new(),
            config,
        })
    }

    fn get_embed_color(&self, notification: &Notification) -> u32 {
        match notification {
            Notification::Transition { .. } => 0x00ff00, // Green for restocks
            Notification::CheckoutFinished { outcome, .. } => match outcome {
                CheckoutOutcome::Success => 0x0099ff,
                CheckoutOutcome::Failure { .. } => 0xff0000,
                CheckoutOutcome::Skipped { .. } => 0xff9900,
            },
            Notification::TargetStopped { .. } => 0x808080,
        }
    }

    fn create_embed(&self, notification: &Notification) -> serde_json::Value {
        let mut fields = vec![json!({
            "name": "🎯 Target",
            "value": notification.target_id(),
            "inline": true
        })];

        match notification {
            Notification::Transition { event } => {
                fields.push(json!({
                    "name": "📡 Signal",
                    "value": event.status.raw_signal,
                    "inline": true
                }));
                fields.push(json!({
                    "name": "🔁 Polls",
                    "value": event.status.poll_count.to_string(),
                    "inline": true
                }));
            }
            Notification::CheckoutFinished { outcome, elapsed_ms, .. } => {
                fields.push(json!({
                    "name": "🛒 Outcome",
                    "value": outcome.to_string(),
                    "inline": false
                }));
                fields.push(json!({
                    "name": "⏱️ Took",
                    "value": format!("{:.2}s", *elapsed_ms as f64 / 1000.0),
                    "inline": true
                }));
            }
            Notification::TargetStopped { reason, .. } => {
                fields.push(json!({
                    "name": "🏁 Reason",
                    "value": reason.to_string(),
                    "inline": false
                }));
            }
        }

        json!({
            "title": notification.title(),
            "description": notification.body(),
            "color": self.get_embed_color(notification),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "fields": fields,
            "footer": { "text": "Restock Watcher" }
        })
    }

    fn create_webhook_payload(&self, notification: &Notification) -> serde_json::Value {
        let mut payload = json!({
            "embeds": [self.create_embed(notification)]
        });

        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }

        if let Some(avatar_url) = &self.config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        let mut content_parts = Vec::new();

        if let Some(role) = &self.config.mention_role {
            content_parts.push(format!("<@&{}>", role));
        }

        if let Some(user) = &self.config.mention_user {
            content_parts.push(format!("<@{}>", user));
        }

        if !content_parts.is_empty() {
            payload["content"] = json!(content_parts.join(" "));
        }

        payload
    }
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn sink_type(&self) -> &str {
        "discord"
    }

    async fn notify(&self, notification: &Notification) -> Result<NotificationResult> {
        let payload = self.create_webhook_payload(notification);

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(NotificationResult {
                success: true,
                message_id: Some(format!("discord-{}", chrono::Utc::now().timestamp())),
                error: None,
            })
        } else {
            Ok(NotificationResult {
                success: false,
                message_id: None,
                error: Some(format!("webhook returned {}", status)),
            })
        }
    }
}
