//! Driver Monitoring System (DMS)
//!
//! Real-time driver state analysis from pose landmarks:
//! - Eye closure detection (drowsiness)
//! - Head-down detection (phone use)
//! - Reclined posture detection
//! - Gaze direction tracking
//!
//! Signals are fused per frame, then a priority ladder with duration
//! tracking turns them into one `ActivityEvent` per frame. The 2-5 second
//! band is a warning; only crossing the alarm threshold triggers an alarm.

pub mod analysis;
pub mod config;
pub mod detector;
pub mod state;

pub use analysis::{ActivityEvent, ActivityLabel, AlertLevel, DangerLevel};
pub use config::{DmsConfig, FusionConfig};
pub use detector::{FusedSignals, GazeDirection, SignalFusion};
pub use state::{DriverState, DurationTimer};

use pose_capture::PoseFrame;
use thiserror::Error;
use tracing::{debug, info};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Driver monitoring module: the per-session activity classifier
pub struct DmsModule {
    config: DmsConfig,
    fusion: SignalFusion,
    state: DriverState,
}

impl DmsModule {
    /// Create a new DMS module with configuration
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        config.validate()?;
        info!(
            "DMS classifier ready: alarm after {}s eyes closed / {}s head down, warning after {}s",
            config.eyes_closed_alarm_secs, config.head_down_alarm_secs, config.warning_secs
        );
        Ok(Self {
            fusion: SignalFusion::new(config.fusion.clone()),
            state: DriverState::default(),
            config,
        })
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    /// Read-only view of the tracked driver state
    pub fn driver_state(&self) -> &DriverState {
        &self.state
    }

    /// Classify a single frame
    pub fn classify(&mut self, frame: &PoseFrame) -> ActivityEvent {
        let now = frame.timestamp_ns;
        self.state.frames_seen += 1;

        if frame.is_empty() {
            self.state.driver_absent_frames += 1;
            self.state.eyes_closed.update(false, now);
            self.state.head_down.update(false, now);
            return self.event(
                now,
                ActivityLabel::NoDriverDetected,
                0.0,
                AlertLevel::Critical,
                false,
                "No driver detected".to_string(),
                None,
            );
        }
        self.state.driver_absent_frames = 0;

        let signals = self.fusion.fuse(frame);
        let eyes_closed_secs = self.state.eyes_closed.update(signals.eyes_closed, now);
        let head_down_secs = self.state.head_down.update(signals.head_down, now);

        let (activity, confidence, level, trigger, reason) =
            self.decide(&signals, eyes_closed_secs, head_down_secs);

        debug!(
            "Frame {}ns: {} ({:.2}) eyes {:.2}s head {:.2}s",
            now, activity, confidence, eyes_closed_secs, head_down_secs
        );

        self.event(now, activity, confidence, level, trigger, reason, Some(signals))
    }

    /// Priority ladder; first matching rule wins
    fn decide(
        &self,
        s: &FusedSignals,
        eyes_closed_secs: f64,
        head_down_secs: f64,
    ) -> (ActivityLabel, f32, AlertLevel, bool, String) {
        let c = &self.config;

        if s.eyes_closed && eyes_closed_secs >= c.eyes_closed_alarm_secs {
            return (
                ActivityLabel::SleepingEyesClosed,
                0.95,
                AlertLevel::Critical,
                true,
                format!("Eyes closed for {:.1}s", eyes_closed_secs),
            );
        }

        if s.head_down && head_down_secs >= c.head_down_alarm_secs {
            return (
                ActivityLabel::LookingDownPhone,
                0.95,
                AlertLevel::Critical,
                true,
                format!("Looking down for {:.1}s", head_down_secs),
            );
        }

        if s.eyes_closed && eyes_closed_secs > c.warning_secs {
            return (
                ActivityLabel::DrowsyEyesClosing,
                0.80,
                AlertLevel::Warning,
                false,
                format!("Eyes closing... {:.1}s", eyes_closed_secs),
            );
        }

        if s.head_down && head_down_secs > c.warning_secs {
            return (
                ActivityLabel::LookingDownWarning,
                0.80,
                AlertLevel::Warning,
                false,
                format!("Looking down... {:.1}s", head_down_secs),
            );
        }

        if s.body_horizontal && s.body_horizontal_confidence > c.horizontal_min_confidence {
            return (
                ActivityLabel::SleepingHorizontal,
                0.90,
                AlertLevel::Critical,
                true,
                "Body horizontal (sleeping)".to_string(),
            );
        }

        if s.eyes_on_road && s.eyes_on_road_confidence > c.eyes_on_road_min_confidence && !s.eyes_closed
        {
            return (
                ActivityLabel::EyesOnRoad,
                s.eyes_on_road_confidence,
                AlertLevel::Safe,
                false,
                "Eyes open, looking forward".to_string(),
            );
        }

        if s.gaze_confidence > c.gaze_min_confidence {
            match s.gaze_direction {
                GazeDirection::Left => {
                    return (
                        ActivityLabel::LookingLeft,
                        s.gaze_confidence,
                        AlertLevel::Caution,
                        false,
                        "Looking left".to_string(),
                    )
                }
                GazeDirection::Right => {
                    return (
                        ActivityLabel::LookingRight,
                        s.gaze_confidence,
                        AlertLevel::Caution,
                        false,
                        "Looking right".to_string(),
                    )
                }
                GazeDirection::Forward => {}
            }
        }

        (
            ActivityLabel::DriverDetected,
            0.6,
            AlertLevel::Safe,
            false,
            "Driver detected".to_string(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn event(
        &self,
        timestamp_ns: u64,
        activity: ActivityLabel,
        confidence: f32,
        alert_level: AlertLevel,
        trigger_alarm: bool,
        reason: String,
        signals: Option<FusedSignals>,
    ) -> ActivityEvent {
        ActivityEvent {
            timestamp_ns,
            activity,
            confidence,
            alert_level,
            danger_level: alert_level.danger(),
            eyes_closed_duration: self.state.eyes_closed.elapsed_secs(),
            looking_down_duration: self.state.head_down.elapsed_secs(),
            trigger_alarm,
            reason,
            signals,
        }
    }

    /// Reset driver state (on driver change)
    pub fn reset_state(&mut self) {
        self.state.reset();
    }
}
