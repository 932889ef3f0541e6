//! WhatsApp delivery through the CallMeBot HTTP API

use std::time::Duration;

use alerting::{DeliveryReceipt, NotificationMessage, NotificationSink, SinkError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::NotifyError;

pub const DEFAULT_ENDPOINT: &str = "https://api.callmebot.com/whatsapp.php";

/// CallMeBot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallMeBotConfig {
    pub endpoint: String,
    /// Owner phone number with country code, e.g. +919876543210
    pub phone: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

impl Default for CallMeBotConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            phone: String::new(),
            api_key: String::new(),
            request_timeout_secs: 10,
        }
    }
}

/// Strip the characters the API refuses in phone numbers
pub fn clean_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect()
}

/// Sink posting alerts to the owner's WhatsApp
pub struct CallMeBotSink {
    client: Client,
    endpoint: String,
    phone: String,
    api_key: String,
}

impl CallMeBotSink {
    pub fn new(config: CallMeBotConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| NotifyError::Config(format!("HTTP client: {}", e)))?;

        let phone = clean_phone(&config.phone);
        if phone.is_empty() || config.api_key.is_empty() {
            warn!("CallMeBot sink created without phone or API key, sends will fail");
        } else {
            info!(phone = %phone, "CallMeBot sink configured");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint,
            phone,
            api_key: config.api_key,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.phone.is_empty() && !self.api_key.is_empty()
    }
}

#[async_trait]
impl NotificationSink for CallMeBotSink {
    fn name(&self) -> &'static str {
        "callmebot"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<DeliveryReceipt, SinkError> {
        if !self.is_configured() {
            return Err(SinkError::NotConfigured(
                "CallMeBot phone and api_key are required".to_string(),
            ));
        }

        let text = message.render_text();
        debug!(endpoint = %self.endpoint, chars = text.len(), "Sending WhatsApp message");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("phone", self.phone.as_str()),
                ("text", text.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::Transport(format!("request timed out: {}", e))
                } else {
                    SinkError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 200 {
            info!("WhatsApp alert sent");
            Ok(DeliveryReceipt::new("WhatsApp alert sent"))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
