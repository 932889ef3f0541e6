//! Owner Notification Transports
//!
//! Concrete [`NotificationSink`] implementations:
//! - CallMeBot WhatsApp over HTTP
//! - MQTT publish to a vehicle alert topic
//!
//! plus the configuration that selects one of them at startup.

pub mod callmebot;
pub mod mqtt;

use std::sync::Arc;

use alerting::{DisabledSink, LogSink, NotificationSink};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use callmebot::{CallMeBotConfig, CallMeBotSink};
pub use mqtt::{AlertEnvelope, MqttConfig, MqttSink};

/// Notifier setup errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid notifier configuration: {0}")]
    Config(String),
}

/// Selected transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Disabled,
    Log,
    Callmebot,
    Mqtt,
}

/// Notifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub callmebot: CallMeBotConfig,
    pub mqtt: MqttConfig,
}

/// Build the configured sink. The MQTT sink needs a running tokio runtime.
pub fn build_sink(config: &NotifierConfig) -> Result<Arc<dyn NotificationSink>, NotifyError> {
    let sink: Arc<dyn NotificationSink> = match config.kind {
        NotifierKind::Disabled => Arc::new(DisabledSink),
        NotifierKind::Log => Arc::new(LogSink),
        NotifierKind::Callmebot => Arc::new(CallMeBotSink::new(config.callmebot.clone())?),
        NotifierKind::Mqtt => Arc::new(MqttSink::connect(config.mqtt.clone())?),
    };
    info!(sink = sink.name(), "Notification sink selected");
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let sink = build_sink(&NotifierConfig::default()).unwrap();
        assert_eq!(sink.name(), "disabled");
    }

    #[test]
    fn test_kind_from_config_value() {
        let config: NotifierConfig = serde_json::from_str(
            r#"{"kind": "callmebot", "callmebot": {"phone": "+15550100", "api_key": "k"}}"#,
        )
        .unwrap();
        assert_eq!(config.kind, NotifierKind::Callmebot);
        assert_eq!(config.callmebot.endpoint, callmebot::DEFAULT_ENDPOINT);

        let sink = build_sink(&config).unwrap();
        assert_eq!(sink.name(), "callmebot");
    }
}
