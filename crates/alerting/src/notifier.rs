//! Notification sink contract and built-in sinks

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dms::AlertLevel;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Sink failures. All of them are recorded, none are fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Notification sink not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Sink rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Acknowledgement returned by a sink on success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub detail: String,
}

impl DeliveryReceipt {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Kind of outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Driver did not respond to an alarm
    Alert,
    /// Diagnostic message verifying the channel
    Test,
}

/// Structured notification handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub kind: MessageKind,
    pub activity: String,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
    pub alert_level: AlertLevel,
    pub reason: String,
}

impl NotificationMessage {
    /// Plain-text rendering for chat-style transports
    pub fn render_text(&self) -> String {
        match self.kind {
            MessageKind::Alert => format!(
                "*CRITICAL ALERT - DRIVER NOT RESPONDING*\n\n\
                 Driver status: {}\n\
                 Reason: {}\n\
                 Duration: {:.1} seconds\n\
                 Time: {}\n\
                 Alert level: {}\n\n\
                 Driver is not responding to the alarm. Please check immediately!",
                self.activity,
                self.reason,
                self.duration_seconds,
                self.timestamp.to_rfc3339(),
                self.alert_level,
            ),
            MessageKind::Test => "Driver monitoring alert test\n\n\
                 If you received this, owner notifications are working."
                .to_string(),
        }
    }
}

/// Outbound notification channel
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Short transport name for logs and records
    fn name(&self) -> &'static str;

    /// Deliver one message. Implementations enforce their own transport limits.
    async fn send(&self, message: &NotificationMessage) -> Result<DeliveryReceipt, SinkError>;
}

/// Sink that only writes the notification to the log
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<DeliveryReceipt, SinkError> {
        info!(
            kind = ?message.kind,
            activity = %message.activity,
            duration_seconds = message.duration_seconds,
            "Owner notification: {}",
            message.reason
        );
        Ok(DeliveryReceipt::new("logged"))
    }
}

/// Placeholder used when no transport is configured
#[derive(Debug, Default, Clone)]
pub struct DisabledSink;

#[async_trait]
impl NotificationSink for DisabledSink {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn send(&self, _message: &NotificationMessage) -> Result<DeliveryReceipt, SinkError> {
        warn!("Notification dropped: no sink configured");
        Err(SinkError::NotConfigured("no notification sink configured".to_string()))
    }
}
