//! Notifier - outbound notification dispatch
//!
//! ## Responsibilities
//!
//! - Deliver tracking events through the configured channels
//! - Telegram Bot API and generic JSON webhook backends
//!
//! Delivery is best-effort and fire-and-forget: the state transition has
//! already committed by the time a notification is attempted, and a failed
//! send is logged, never retried and never surfaced to the caller.

use crate::tracker::types::TrackEvent;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// Notification channel settings, read once at startup
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub webhook_url: Option<String>,
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        let non_empty = |v: std::result::Result<String, std::env::VarError>| {
            v.ok().filter(|s| !s.trim().is_empty())
        };
        Self {
            telegram_bot_token: non_empty(std::env::var("TELEGRAM_BOT_TOKEN")),
            telegram_chat_id: non_empty(std::env::var("TELEGRAM_CHAT_ID")),
            webhook_url: non_empty(std::env::var("NOTIFY_WEBHOOK")),
        }
    }

    pub fn any_channel(&self) -> bool {
        (self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some())
            || self.webhook_url.is_some()
    }
}

/// Notification service with pluggable channels
pub struct Notifier {
    http: Client,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(config: NotifierConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        Self { http, config }
    }

    /// Deliver one event through every configured channel.
    ///
    /// Each channel is attempted independently; a failure in one does not
    /// stop the others.
    pub async fn notify_event(&self, event: &TrackEvent) {
        let message = Self::format_message(event);
        tracing::info!(
            plate = %event.plate(),
            event_type = %event.kind(),
            "Notification: {}",
            message
        );

        if self.config.telegram_bot_token.is_some() && self.config.telegram_chat_id.is_some() {
            if let Err(e) = self.send_telegram(&message).await {
                tracing::error!(plate = %event.plate(), error = %e, "Telegram notification failed");
            }
        }

        if self.config.webhook_url.is_some() {
            if let Err(e) = self.send_webhook(event, &message).await {
                tracing::error!(plate = %event.plate(), error = %e, "Webhook notification failed");
            }
        }
    }

    /// Human-readable message for chat channels
    pub fn format_message(event: &TrackEvent) -> String {
        match event {
            TrackEvent::Entry(e) => {
                format!("Vehicle {}: entered tracking at {}", e.plate, e.camera_id)
            }
            TrackEvent::Moved(e) => format!(
                "Vehicle {}: moved to {} (path {})",
                e.plate,
                e.camera_id,
                e.path.join(" -> ")
            ),
            TrackEvent::Exit(e) => {
                format!("Vehicle {}: exited at {}", e.plate, e.camera_id)
            }
            TrackEvent::LastSeen(e) => {
                let place = e.camera_name.as_deref().unwrap_or(&e.camera_id);
                format!(
                    "Vehicle {}: last seen near {} ({})",
                    e.plate,
                    place,
                    e.final_status.label()
                )
            }
        }
    }

    async fn send_telegram(&self, message: &str) -> crate::Result<()> {
        let (token, chat_id) = match (
            &self.config.telegram_bot_token,
            &self.config.telegram_chat_id,
        ) {
            (Some(token), Some(chat_id)) => (token, chat_id),
            _ => return Ok(()),
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
        let payload = json!({
            "chat_id": chat_id,
            "text": message,
            "parse_mode": "HTML"
        });

        let response = self.http.post(&url).json(&payload).send().await?;
        response.error_for_status()?;
        Ok(())
    }

    async fn send_webhook(&self, event: &TrackEvent, message: &str) -> crate::Result<()> {
        let url = match &self.config.webhook_url {
            Some(url) => url,
            None => return Ok(()),
        };

        let payload = json!({
            "plate": event.plate(),
            "event_type": event.kind(),
            "message": message,
            "event": event,
        });

        let response = self.http.post(url).json(&payload).send().await?;
        response.error_for_status()?;
        Ok(())
    }
}
