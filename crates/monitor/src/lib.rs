//! Driver Monitoring Sessions
//!
//! Ties the pipeline together per driver:
//! - DMS classification of each pose frame
//! - Alarm escalation and owner notification
//! - Activity log with retention
//!
//! Sessions live in a registry keyed by id and are independent of each other.

mod registry;
mod session;

pub use registry::SessionRegistry;
pub use session::{FrameReport, MonitorSession, ReplaySummary, SessionInfo};

use alerting::{AlertConfig, AlertError};
use dms::{DmsConfig, DmsError};
use pose_capture::PoseError;
use serde::{Deserialize, Serialize};
use storage::{StorageConfig, StorageError};
use thiserror::Error;
use uuid::Uuid;

/// Monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Landmark source failed: {0}")]
    Source(#[from] PoseError),
}

/// Per-session pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub dms: DmsConfig,
    pub alerting: AlertConfig,
    pub storage: StorageConfig,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        self.dms.validate()?;
        self.alerting.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{DisabledSink, LogSink, NotificationSink};
    use dms::{ActivityLabel, AlertLevel};
    use pose_capture::{Keypoint, Landmark, PoseFrame, ReplaySource};
    use std::sync::Arc;
    use std::time::Duration;

    const FRAME_NS: u64 = 100_000_000;

    fn upright(timestamp_ns: u64) -> PoseFrame {
        PoseFrame::new(
            vec![
                Landmark::new(Keypoint::Nose, 320.0, 210.0, 0.95),
                Landmark::new(Keypoint::LeftEye, 300.0, 180.0, 0.9),
                Landmark::new(Keypoint::RightEye, 340.0, 180.0, 0.9),
                Landmark::new(Keypoint::LeftEar, 270.0, 200.0, 0.8),
                Landmark::new(Keypoint::RightEar, 370.0, 200.0, 0.8),
                Landmark::new(Keypoint::LeftShoulder, 250.0, 300.0, 0.9),
                Landmark::new(Keypoint::RightShoulder, 390.0, 300.0, 0.9),
                Landmark::new(Keypoint::LeftHip, 260.0, 450.0, 0.7),
                Landmark::new(Keypoint::RightHip, 380.0, 450.0, 0.7),
            ],
            timestamp_ns,
        )
    }

    fn eyes_closed(timestamp_ns: u64) -> PoseFrame {
        let mut frame = upright(timestamp_ns);
        for landmark in frame.landmarks.iter_mut() {
            if matches!(landmark.keypoint, Keypoint::LeftEye | Keypoint::RightEye) {
                landmark.confidence = Some(0.1);
            }
        }
        frame
    }

    /// Frames every 100ms over `[from, to)` seconds
    fn frames(from_secs: u64, to_secs: u64, make: fn(u64) -> PoseFrame) -> Vec<PoseFrame> {
        (from_secs * 10..to_secs * 10).map(|i| make(i * FRAME_NS)).collect()
    }

    fn session(sink: Arc<dyn NotificationSink>) -> MonitorSession {
        MonitorSession::new(&MonitorConfig::default(), sink).unwrap()
    }

    #[tokio::test]
    async fn test_unresponsive_driver_notifies_owner_once() {
        let session = session(Arc::new(LogSink));
        let mut source = ReplaySource::new(frames(0, 30, eyes_closed));

        let summary = session.replay(&mut source).unwrap();
        session.flush().await;

        assert_eq!(summary.frames, 300);
        assert_eq!(summary.notifications_dispatched, 1);
        assert_eq!(summary.last_activity, Some(ActivityLabel::SleepingEyesClosed));

        let history = session.notification_history(10);
        assert_eq!(history.len(), 1);
        assert!(history[0].result.success);
        // Alarm at 5.0s, notification 10s later
        assert!((history[0].elapsed_at_send - 10.0).abs() < 1e-6);
        assert!(session.escalation_status().notified);
    }

    #[tokio::test]
    async fn test_driver_recovers_before_timeout() {
        let session = session(Arc::new(LogSink));
        let mut replay: Vec<_> = frames(0, 7, eyes_closed);
        replay.extend(frames(7, 30, upright));

        let summary = session.replay(&mut ReplaySource::new(replay)).unwrap();
        session.flush().await;

        assert!(summary.alarms_triggered > 0);
        assert_eq!(summary.notifications_dispatched, 0);
        assert!(session.notification_history(10).is_empty());
        assert!(!session.info().alarm_active);
        assert_eq!(summary.last_activity, Some(ActivityLabel::EyesOnRoad));
    }

    #[tokio::test]
    async fn test_empty_frames_never_escalate() {
        let session = session(Arc::new(LogSink));
        let summary = session
            .replay(&mut ReplaySource::new(frames(0, 20, PoseFrame::empty)))
            .unwrap();

        assert_eq!(summary.alarms_triggered, 0);
        assert_eq!(summary.notifications_dispatched, 0);

        let events = session.recent_events(None, 1).unwrap();
        assert_eq!(events[0].event.activity, ActivityLabel::NoDriverDetected);
        assert_eq!(events[0].event.alert_level, AlertLevel::Critical);
        assert!(!events[0].event.trigger_alarm);
    }

    #[tokio::test]
    async fn test_unconfigured_sink_failure_is_recorded_and_retried() {
        let session = session(Arc::new(DisabledSink));
        let origin = session.origin();

        let mut replay = frames(0, 16, eyes_closed);
        let last = replay.pop().unwrap();
        session.replay(&mut ReplaySource::new(replay)).unwrap();
        session.flush().await;

        // Failed attempt does not mark the episode notified
        let status = session.escalation_status();
        assert!(status.alarm_active);
        assert!(!status.notified);
        assert_eq!(status.total_notifications_sent, 0);
        assert_eq!(session.notification_history(10).len(), 1);

        // The retry interval gates the next attempt
        let report = session
            .process_frame_at(&last, origin + Duration::from_secs(20))
            .unwrap();
        assert!(report.dispatched);
        session.flush().await;
        assert_eq!(session.notification_history(10).len(), 2);
    }

    #[tokio::test]
    async fn test_reset_classifier_restarts_timers() {
        let session = session(Arc::new(LogSink));
        let origin = session.origin();
        let step = |frame: PoseFrame| {
            let at = origin + Duration::from_nanos(frame.timestamp_ns);
            session.process_frame_at(&frame, at).unwrap()
        };

        for frame in frames(0, 4, eyes_closed) {
            step(frame);
        }
        session.reset_classifier();

        // Without the reset the eyes would have been closed for 5s by now
        let reports: Vec<_> = frames(4, 8, eyes_closed).into_iter().map(step).collect();
        assert!(reports.iter().all(|r| !r.event.trigger_alarm));
        assert!(!session.info().alarm_active);
        let last = reports.last().unwrap();
        assert!(last.event.eyes_closed_duration < 4.0);
    }

    #[tokio::test]
    async fn test_event_queries() {
        let session = session(Arc::new(LogSink));
        let mut replay = frames(0, 2, upright);
        replay.extend(frames(2, 8, eyes_closed));
        session.replay(&mut ReplaySource::new(replay)).unwrap();

        let later = session.events_since(7 * 1_000_000_000, 100).unwrap();
        assert_eq!(later.len(), 10);
        assert!(later[0].event.timestamp_ns < later[9].event.timestamp_ns);
        assert_eq!(session.events_since(0, 3).unwrap().len(), 3);

        let alarms = session.recent_events(Some(AlertLevel::Critical), 100).unwrap();
        assert!(!alarms.is_empty());
        assert!(alarms.iter().all(|r| r.event.alert_level == AlertLevel::Critical));
    }

    #[tokio::test]
    async fn test_external_trigger_and_response() {
        let session = session(Arc::new(LogSink));
        let details = alerting::AlertDetails::new(
            "looking_down_phone",
            0.85,
            AlertLevel::Critical,
            5.0,
            "Looking down for 5.0s",
        );

        assert!(matches!(
            session.alarm_triggered(details),
            alerting::EpisodeTransition::Started(_)
        ));
        assert!(session.escalation_status().alarm_active);
        assert!(matches!(
            session.check_timeout(),
            alerting::TimeoutCheck::Waiting { .. }
        ));
        assert!(matches!(
            session.driver_responded(),
            alerting::EpisodeTransition::Reset { notified: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = SessionRegistry::new(MonitorConfig::default(), Arc::new(LogSink)).unwrap();
        let first = registry.create().await.unwrap();
        let second = registry.create().await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len().await, 2);

        first.process_frame(&upright(0)).unwrap();
        let info = registry.close(first.id()).await.unwrap();
        assert_eq!(info.frames_processed, 1);
        assert!(matches!(
            registry.get(first.id()).await,
            Err(MonitorError::SessionNotFound(_))
        ));

        registry.shutdown().await;
        assert!(registry.is_empty().await);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = MonitorConfig::default();
        config.alerting.response_timeout_secs = 0.0;
        assert!(matches!(
            SessionRegistry::new(config, Arc::new(LogSink)),
            Err(MonitorError::Alert(_))
        ));
    }
}
