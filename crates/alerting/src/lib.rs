//! Alert Escalation
//!
//! Turns driver alarms into owner notifications: a per-session state machine
//! with a response timeout, a cross-episode cooldown and an append-only
//! notification history, plus the sink contract transports implement.

pub mod config;
pub mod history;
pub mod manager;
pub mod notifier;
pub mod service;

pub use config::{AlertConfig, ResetPolicy};
pub use history::{NotificationHistory, NotificationRecord, SinkResult};
pub use manager::{
    AlertDetails, EpisodeTransition, EscalationManager, EscalationStatus, NotificationRequest,
    TimeoutCheck,
};
pub use notifier::{
    DeliveryReceipt, DisabledSink, LogSink, MessageKind, NotificationMessage, NotificationSink,
    SinkError,
};
pub use service::{deliver, EscalationService};

use thiserror::Error;

/// Alerting errors
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Invalid alert configuration: {0}")]
    Config(String),
}
