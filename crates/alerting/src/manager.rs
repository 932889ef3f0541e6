//! Escalation state machine
//!
//! One episode at a time: an alarm opens it, a driver response or a safe
//! observation closes it, and if it stays open past the response timeout the
//! owner is notified once. Successful notifications are spaced by a global
//! cooldown. All methods take the current instant so the machine is driven
//! entirely by the caller's clock.

use std::time::Instant;

use chrono::{DateTime, Utc};
use dms::{ActivityEvent, AlertLevel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AlertConfig;
use crate::history::{NotificationHistory, NotificationRecord, SinkResult};
use crate::notifier::{DeliveryReceipt, MessageKind, NotificationMessage, SinkError};
use crate::AlertError;

/// Snapshot of what raised the alarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDetails {
    pub activity: String,
    pub confidence: f32,
    pub alert_level: AlertLevel,
    /// Danger duration reported at trigger time (seconds)
    pub duration_seconds: f64,
    pub reason: String,
    pub triggered_at: DateTime<Utc>,
}

impl AlertDetails {
    pub fn new(
        activity: impl Into<String>,
        confidence: f32,
        alert_level: AlertLevel,
        duration_seconds: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            activity: activity.into(),
            confidence,
            alert_level,
            duration_seconds,
            reason: reason.into(),
            triggered_at: Utc::now(),
        }
    }

    pub fn from_event(event: &ActivityEvent) -> Self {
        Self::new(
            event.activity.as_str(),
            event.confidence,
            event.alert_level,
            event.danger_duration(),
            event.reason.clone(),
        )
    }

    fn test_send() -> Self {
        Self::new("test", 1.0, AlertLevel::Safe, 0.0, "Manual test notification")
    }
}

/// Effect of an input on the current episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeTransition {
    /// A new episode opened
    Started(u64),
    /// An episode was already open; the countdown keeps running
    AlreadyActive(u64),
    /// The open episode ended
    Reset { episode_id: u64, notified: bool },
    /// Nothing changed
    Unchanged,
}

/// A notification the caller must hand to a sink, then report back through
/// [`EscalationManager::complete_dispatch`]
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub request_id: u64,
    pub episode_id: Option<u64>,
    pub details: AlertDetails,
    pub message: NotificationMessage,
    pub elapsed_secs: f64,
    pub dispatched_at: Instant,
    pub forced: bool,
}

/// Result of a timeout check
#[derive(Debug, Clone)]
pub enum TimeoutCheck {
    /// No open episode
    Idle,
    /// The open episode has already produced its notification
    AlreadyNotified,
    /// An escalation send is still running. It may belong to an episode that
    /// has since ended; sends are serialized per manager, not per episode.
    InFlight,
    /// The driver still has time to respond
    Waiting { remaining_secs: f64 },
    /// The last attempt failed; waiting before retrying
    Backoff { retry_in_secs: f64 },
    /// Timed out, but a recent successful send holds the cooldown
    RateLimited { retry_in_secs: f64 },
    /// Timed out; send this now
    Dispatch(NotificationRequest),
}

/// Read-only view of the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationStatus {
    pub alarm_active: bool,
    pub episode_id: Option<u64>,
    pub elapsed_seconds: f64,
    pub timeout_seconds: f64,
    pub seconds_until_notify: f64,
    pub notified: bool,
    pub send_in_flight: bool,
    pub current_activity: String,
    pub cooldown_remaining_seconds: f64,
    pub total_notifications_sent: u64,
    pub episodes_started: u64,
}

#[derive(Debug)]
struct AlertEpisode {
    id: u64,
    started_at: Instant,
    details: AlertDetails,
    notified_at: Option<Instant>,
    last_failure_at: Option<Instant>,
}

/// Alarm escalation manager
#[derive(Debug)]
pub struct EscalationManager {
    config: AlertConfig,
    episode: Option<AlertEpisode>,
    /// Request id of the escalation send currently running. Survives the end
    /// of its episode and blocks dispatch for the next one until it completes.
    in_flight: Option<u64>,
    /// Dispatch instant of the last successful send
    last_sent_at: Option<Instant>,
    current_activity: String,
    history: NotificationHistory,
    next_episode_id: u64,
    next_request_id: u64,
}

fn secs_between(earlier: Instant, later: Instant) -> f64 {
    later.saturating_duration_since(earlier).as_secs_f64()
}

impl EscalationManager {
    pub fn new(config: AlertConfig) -> Result<Self, AlertError> {
        config.validate()?;
        info!(
            timeout_secs = config.response_timeout_secs,
            cooldown_secs = config.cooldown_secs,
            "Creating escalation manager"
        );
        Ok(Self {
            history: NotificationHistory::new(config.history_limit),
            config,
            episode: None,
            in_flight: None,
            last_sent_at: None,
            current_activity: "none".to_string(),
            next_episode_id: 1,
            next_request_id: 1,
        })
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn is_alarm_active(&self) -> bool {
        self.episode.is_some()
    }

    /// Open an episode unless one is already open
    pub fn on_alarm_triggered(&mut self, details: AlertDetails, now: Instant) -> EpisodeTransition {
        self.current_activity = details.activity.clone();

        if let Some(episode) = &self.episode {
            debug!(episode_id = episode.id, "Alarm already active, countdown continues");
            return EpisodeTransition::AlreadyActive(episode.id);
        }

        let id = self.next_episode_id;
        self.next_episode_id += 1;
        warn!(
            episode_id = id,
            activity = %details.activity,
            timeout_secs = self.config.response_timeout_secs,
            "Alarm triggered: {}",
            details.reason
        );
        self.episode = Some(AlertEpisode {
            id,
            started_at: now,
            details,
            notified_at: None,
            last_failure_at: None,
        });
        EpisodeTransition::Started(id)
    }

    /// Driver acknowledged the alarm. A send already running is left to finish
    /// and is still reported through [`Self::complete_dispatch`].
    pub fn on_driver_response(&mut self, now: Instant) -> EpisodeTransition {
        match self.episode.take() {
            Some(episode) => {
                info!(
                    episode_id = episode.id,
                    response_secs = secs_between(episode.started_at, now),
                    "Driver responded, alarm cleared"
                );
                EpisodeTransition::Reset {
                    episode_id: episode.id,
                    notified: episode.notified_at.is_some(),
                }
            }
            None => EpisodeTransition::Unchanged,
        }
    }

    /// Feed a classified frame: alarms open episodes, responsive states close them
    pub fn on_activity_observed(&mut self, event: &ActivityEvent, now: Instant) -> EpisodeTransition {
        if event.trigger_alarm {
            return self.on_alarm_triggered(AlertDetails::from_event(event), now);
        }

        self.current_activity = event.activity.as_str().to_string();
        if self.episode.is_some() && self.config.reset_policy.resets_on(event.alert_level) {
            debug!(activity = %event.activity, "Responsive activity observed");
            return self.on_driver_response(now);
        }
        EpisodeTransition::Unchanged
    }

    fn cooldown_remaining(&self, now: Instant) -> Option<f64> {
        let last = self.last_sent_at?;
        let remaining = self.config.cooldown_secs - secs_between(last, now);
        (remaining > 0.0).then_some(remaining)
    }

    fn take_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Decide whether the open episode needs an owner notification now
    pub fn check_timeout(&mut self, now: Instant) -> TimeoutCheck {
        let cooldown = self.cooldown_remaining(now);
        let timeout = self.config.response_timeout_secs;
        let retry_interval = self.config.retry_interval_secs;

        let Some(episode) = &self.episode else {
            return TimeoutCheck::Idle;
        };
        if episode.notified_at.is_some() {
            return TimeoutCheck::AlreadyNotified;
        }
        if self.in_flight.is_some() {
            return TimeoutCheck::InFlight;
        }

        let elapsed = secs_between(episode.started_at, now);
        if elapsed < timeout {
            return TimeoutCheck::Waiting {
                remaining_secs: timeout - elapsed,
            };
        }

        if let Some(failed_at) = episode.last_failure_at {
            let since = secs_between(failed_at, now);
            if since < retry_interval {
                return TimeoutCheck::Backoff {
                    retry_in_secs: retry_interval - since,
                };
            }
        }

        if let Some(remaining) = cooldown {
            warn!(
                episode_id = episode.id,
                cooldown_remaining_secs = remaining,
                "Owner notification suppressed by cooldown"
            );
            return TimeoutCheck::RateLimited {
                retry_in_secs: remaining,
            };
        }

        let episode_id = episode.id;
        let details = episode.details.clone();
        let request_id = self.take_request_id();
        let message = NotificationMessage {
            kind: MessageKind::Alert,
            activity: details.activity.clone(),
            duration_seconds: details.duration_seconds + elapsed,
            timestamp: Utc::now(),
            alert_level: details.alert_level,
            reason: format!("{} (no response for {:.1}s)", details.reason, elapsed),
        };

        warn!(
            episode_id,
            request_id,
            elapsed_secs = elapsed,
            "Driver not responding, notifying owner"
        );
        self.in_flight = Some(request_id);

        TimeoutCheck::Dispatch(NotificationRequest {
            request_id,
            episode_id: Some(episode_id),
            details,
            message,
            elapsed_secs: elapsed,
            dispatched_at: now,
            forced: false,
        })
    }

    /// Build a test notification that bypasses the cooldown and the episode
    pub fn force_send(&mut self, now: Instant) -> NotificationRequest {
        let details = AlertDetails::test_send();
        let message = NotificationMessage {
            kind: MessageKind::Test,
            activity: details.activity.clone(),
            duration_seconds: 0.0,
            timestamp: Utc::now(),
            alert_level: details.alert_level,
            reason: details.reason.clone(),
        };
        NotificationRequest {
            request_id: self.take_request_id(),
            episode_id: None,
            details,
            message,
            elapsed_secs: 0.0,
            dispatched_at: now,
            forced: true,
        }
    }

    /// Record the sink outcome for a request and apply it to the episode
    pub fn complete_dispatch(
        &mut self,
        request: &NotificationRequest,
        outcome: &Result<DeliveryReceipt, SinkError>,
    ) -> SinkResult {
        let result = SinkResult::from(outcome);

        if self.in_flight == Some(request.request_id) {
            self.in_flight = None;
        }

        if result.success {
            self.last_sent_at = Some(match self.last_sent_at {
                Some(last) => last.max(request.dispatched_at),
                None => request.dispatched_at,
            });
        }

        match self
            .episode
            .as_mut()
            .filter(|episode| request.episode_id == Some(episode.id))
        {
            Some(episode) if result.success => {
                info!(episode_id = episode.id, "Owner notified");
                episode.notified_at = Some(request.dispatched_at);
            }
            Some(episode) => {
                warn!(
                    episode_id = episode.id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Owner notification failed"
                );
                episode.last_failure_at = Some(request.dispatched_at);
            }
            None if !request.forced => {
                debug!(request_id = request.request_id, "Send completed after its episode ended");
            }
            None => {}
        }

        self.history.push(NotificationRecord {
            timestamp: Utc::now(),
            episode_id: request.episode_id,
            details: request.details.clone(),
            result: result.clone(),
            elapsed_at_send: request.elapsed_secs,
            forced: request.forced,
        });

        result
    }

    pub fn status(&self, now: Instant) -> EscalationStatus {
        let timeout = self.config.response_timeout_secs;
        let (elapsed, notified, episode_id) = match &self.episode {
            Some(episode) => (
                secs_between(episode.started_at, now),
                episode.notified_at.is_some(),
                Some(episode.id),
            ),
            None => (0.0, false, None),
        };

        EscalationStatus {
            alarm_active: self.episode.is_some(),
            episode_id,
            elapsed_seconds: elapsed,
            timeout_seconds: timeout,
            seconds_until_notify: if self.episode.is_some() {
                (timeout - elapsed).max(0.0)
            } else {
                0.0
            },
            notified,
            send_in_flight: self.in_flight.is_some(),
            current_activity: self.current_activity.clone(),
            cooldown_remaining_seconds: self.cooldown_remaining(now).unwrap_or(0.0),
            total_notifications_sent: self.history.successes(),
            episodes_started: self.next_episode_id - 1,
        }
    }

    /// Most recent notification records, oldest first
    pub fn history(&self, limit: usize) -> Vec<NotificationRecord> {
        self.history.recent(limit)
    }
}

impl Default for EscalationManager {
    fn default() -> Self {
        Self {
            history: NotificationHistory::new(AlertConfig::default().history_limit),
            config: AlertConfig::default(),
            episode: None,
            in_flight: None,
            last_sent_at: None,
            current_activity: "none".to_string(),
            next_episode_id: 1,
            next_request_id: 1,
        }
    }
}
