//! Monitoring session: classifier, escalation and activity log for one driver

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use alerting::{
    AlertDetails, EpisodeTransition, EscalationService, EscalationStatus, NotificationRecord,
    NotificationSink, SinkResult, TimeoutCheck,
};
use chrono::{DateTime, Utc};
use dms::{ActivityEvent, ActivityLabel, AlertLevel, DmsModule};
use metrics::counter;
use pose_capture::{LandmarkSource, PoseFrame};
use serde::{Deserialize, Serialize};
use storage::{ActivityRecord, ActivityRepository, ActivitySummary};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{MonitorConfig, MonitorError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of processing one frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameReport {
    pub record_id: u64,
    pub event: ActivityEvent,
    /// An owner notification was dispatched on this frame
    pub dispatched: bool,
    pub escalation: EscalationStatus,
}

/// Session bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub frames_processed: u64,
    pub alarm_active: bool,
    pub sink: String,
}

/// Totals from replaying a landmark source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub frames: u64,
    pub alarms_triggered: u64,
    pub notifications_dispatched: u64,
    pub last_activity: Option<ActivityLabel>,
}

pub struct MonitorSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    origin: Instant,
    classifier: Mutex<DmsModule>,
    escalation: EscalationService,
    log: ActivityRepository,
    frames_processed: AtomicU64,
}

impl MonitorSession {
    pub fn new(config: &MonitorConfig, sink: Arc<dyn NotificationSink>) -> Result<Self, MonitorError> {
        let classifier = DmsModule::new(config.dms.clone())?;
        let escalation = EscalationService::new(config.alerting.clone(), sink)?;
        let id = Uuid::new_v4();
        info!(session_id = %id, "Monitoring session started");

        Ok(Self {
            id,
            started_at: Utc::now(),
            origin: Instant::now(),
            classifier: Mutex::new(classifier),
            escalation,
            log: ActivityRepository::new(&config.storage),
            frames_processed: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            started_at: self.started_at,
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            alarm_active: self.escalation.is_alarm_active(),
            sink: self.escalation.sink_name().to_string(),
        }
    }

    pub fn process_frame(&self, frame: &PoseFrame) -> Result<FrameReport, MonitorError> {
        self.process_frame_at(frame, Instant::now())
    }

    /// Classify a frame, feed the escalation manager and poll its timeout
    pub fn process_frame_at(&self, frame: &PoseFrame, now: Instant) -> Result<FrameReport, MonitorError> {
        // Held for the whole step so frames of one session are applied in order
        let mut classifier = lock(&self.classifier);
        let event = classifier.classify(frame);

        counter!("dms_frames_processed_total").increment(1);
        counter!("dms_activity_total", "activity" => event.activity.as_str()).increment(1);

        let transition = self.escalation.observe_at(&event, now);
        let check = self.escalation.check_timeout_at(now);
        debug!(
            session_id = %self.id,
            activity = %event.activity,
            level = %event.alert_level,
            ?transition,
            "Frame processed"
        );
        let dispatched = if let TimeoutCheck::Dispatch(request) = &check {
            info!(
                session_id = %self.id,
                request_id = request.request_id,
                "Owner notification dispatched"
            );
            true
        } else {
            false
        };

        let record_id = self.log.insert(event.clone())?;
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        drop(classifier);

        Ok(FrameReport {
            record_id,
            event,
            dispatched,
            escalation: self.escalation.status_at(now),
        })
    }

    /// Replay a source, mapping frame timestamps onto the session clock
    pub fn replay(&self, source: &mut dyn LandmarkSource) -> Result<ReplaySummary, MonitorError> {
        let mut summary = ReplaySummary::default();
        let mut first_ns = None;

        while let Some(frame) = source.get_frame()? {
            let base = *first_ns.get_or_insert(frame.timestamp_ns);
            let offset = Duration::from_nanos(frame.timestamp_ns.saturating_sub(base));
            let report = self.process_frame_at(&frame, self.origin + offset)?;

            summary.frames += 1;
            if report.event.trigger_alarm {
                summary.alarms_triggered += 1;
            }
            if report.dispatched {
                summary.notifications_dispatched += 1;
            }
            summary.last_activity = Some(report.event.activity);
        }

        info!(session_id = %self.id, frames = summary.frames, "Replay finished");
        Ok(summary)
    }

    pub fn alarm_triggered(&self, details: AlertDetails) -> EpisodeTransition {
        self.escalation.trigger_at(details, Instant::now())
    }

    pub fn driver_responded(&self) -> EpisodeTransition {
        self.escalation.respond_at(Instant::now())
    }

    pub fn check_timeout(&self) -> TimeoutCheck {
        self.escalation.check_timeout_at(Instant::now())
    }

    pub fn escalation_status(&self) -> EscalationStatus {
        self.escalation.status_at(Instant::now())
    }

    pub fn notification_history(&self, limit: usize) -> Vec<NotificationRecord> {
        self.escalation.history(limit)
    }

    pub async fn send_test_notification(&self) -> SinkResult {
        self.escalation.force_send_at(Instant::now()).await
    }

    /// Newest first, optionally only at or above `min_level`
    pub fn recent_events(
        &self,
        min_level: Option<AlertLevel>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, MonitorError> {
        Ok(self.log.recent(min_level, limit)?)
    }

    /// Events from frame time `since_ns` onward, oldest first
    pub fn events_since(&self, since_ns: u64, limit: usize) -> Result<Vec<ActivityRecord>, MonitorError> {
        let mut events = self.log.since(since_ns)?;
        events.truncate(limit);
        Ok(events)
    }

    pub fn activity_summary(&self) -> Result<ActivitySummary, MonitorError> {
        Ok(self.log.summary()?)
    }

    /// Clear the duration timers, e.g. after a driver change.
    /// An open alarm episode is left to the escalation manager.
    pub fn reset_classifier(&self) {
        lock(&self.classifier).reset_state();
        info!(session_id = %self.id, "Classifier timers reset");
    }

    /// Wait for outstanding notification sends
    pub async fn flush(&self) {
        self.escalation.flush().await;
    }

    /// Flush sends and report final bookkeeping
    pub async fn close(&self) -> SessionInfo {
        self.flush().await;
        let info = self.info();
        info!(
            session_id = %self.id,
            frames = info.frames_processed,
            "Monitoring session closed"
        );
        info
    }

    #[cfg(test)]
    pub(crate) fn origin(&self) -> Instant {
        self.origin
    }
}
