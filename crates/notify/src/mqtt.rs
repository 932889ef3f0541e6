//! Alert publishing over MQTT

use std::time::Duration;

use alerting::{DeliveryReceipt, NotificationMessage, NotificationSink, SinkError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::NotifyError;

/// MQTT sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub vehicle_id: String,
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            vehicle_id: "unknown".to_string(),
            topic_prefix: "vehicles".to_string(),
            keep_alive_secs: 30,
        }
    }
}

impl MqttConfig {
    pub fn topic(&self) -> String {
        format!("{}/{}/alerts", self.topic_prefix, self.vehicle_id)
    }
}

/// Payload published for each notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEnvelope {
    pub message_type: String,
    pub message_id: Uuid,
    pub vehicle_id: String,
    pub published_at: DateTime<Utc>,
    pub notification: NotificationMessage,
    pub text: String,
}

impl AlertEnvelope {
    pub fn new(vehicle_id: &str, notification: &NotificationMessage) -> Self {
        Self {
            message_type: "driver_alert".to_string(),
            message_id: Uuid::new_v4(),
            vehicle_id: vehicle_id.to_string(),
            published_at: Utc::now(),
            notification: notification.clone(),
            text: notification.render_text(),
        }
    }
}

/// Sink publishing alerts to a broker
///
/// A successful send means the broker client accepted the publish; delivery
/// is then retried by the client's event loop.
pub struct MqttSink {
    config: MqttConfig,
    client: AsyncClient,
}

impl MqttSink {
    /// Create the client and spawn its event loop. Must run inside a tokio runtime.
    pub fn connect(config: MqttConfig) -> Result<Self, NotifyError> {
        if config.vehicle_id.is_empty() {
            return Err(NotifyError::Config("mqtt vehicle_id must not be empty".to_string()));
        }

        let mut options = MqttOptions::new(
            format!("driver-watch-{}", config.vehicle_id),
            &config.broker_host,
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(incoming)) => {
                        debug!("MQTT incoming: {:?}", incoming);
                    }
                    Err(e) => {
                        error!("MQTT error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    _ => {}
                }
            }
        });

        info!(
            broker = %config.broker_host,
            port = config.broker_port,
            topic = %config.topic(),
            "MQTT sink started"
        );
        Ok(Self { config, client })
    }
}

#[async_trait]
impl NotificationSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<DeliveryReceipt, SinkError> {
        let envelope = AlertEnvelope::new(&self.config.vehicle_id, message);
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| SinkError::Transport(format!("serialization: {}", e)))?;

        let topic = self.config.topic();
        self.client
            .publish(&topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        debug!(topic = %topic, message_id = %envelope.message_id, "Alert published");
        Ok(DeliveryReceipt::new(format!("published {}", envelope.message_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::MessageKind;
    use dms::AlertLevel;

    #[test]
    fn test_topic_layout() {
        let config = MqttConfig {
            vehicle_id: "truck-7".to_string(),
            ..Default::default()
        };
        assert_eq!(config.topic(), "vehicles/truck-7/alerts");
    }

    #[test]
    fn test_envelope_payload() {
        let notification = NotificationMessage {
            kind: MessageKind::Alert,
            activity: "looking_down_phone".to_string(),
            duration_seconds: 15.0,
            timestamp: Utc::now(),
            alert_level: AlertLevel::Critical,
            reason: "Looking down for 5.0s".to_string(),
        };
        let envelope = AlertEnvelope::new("truck-7", &notification);
        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["message_type"], "driver_alert");
        assert_eq!(json["vehicle_id"], "truck-7");
        assert_eq!(json["notification"]["alert_level"], "CRITICAL");
        assert_eq!(json["notification"]["kind"], "alert");
    }

    #[tokio::test]
    async fn test_rejects_empty_vehicle_id() {
        let config = MqttConfig {
            vehicle_id: String::new(),
            ..Default::default()
        };
        assert!(matches!(MqttSink::connect(config), Err(NotifyError::Config(_))));
    }
}
