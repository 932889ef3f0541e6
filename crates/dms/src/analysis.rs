//! Classified driver activity events

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::detector::FusedSignals;

/// Driver activity label, one per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLabel {
    NoDriverDetected,
    SleepingEyesClosed,
    LookingDownPhone,
    DrowsyEyesClosing,
    LookingDownWarning,
    SleepingHorizontal,
    EyesOnRoad,
    LookingLeft,
    LookingRight,
    DriverDetected,
}

impl ActivityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoDriverDetected => "no_driver_detected",
            Self::SleepingEyesClosed => "sleeping_eyes_closed",
            Self::LookingDownPhone => "looking_down_phone",
            Self::DrowsyEyesClosing => "drowsy_eyes_closing",
            Self::LookingDownWarning => "looking_down_warning",
            Self::SleepingHorizontal => "sleeping_horizontal",
            Self::EyesOnRoad => "eyes_on_road",
            Self::LookingLeft => "looking_left",
            Self::LookingRight => "looking_right",
            Self::DriverDetected => "driver_detected",
        }
    }
}

impl fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert level of an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Safe,
    Caution,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Caution => "CAUTION",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    /// Danger level conventionally paired with this alert level
    pub fn danger(&self) -> DangerLevel {
        match self {
            Self::Safe => DangerLevel::Low,
            Self::Caution => DangerLevel::Medium,
            Self::Warning | Self::Critical => DangerLevel::High,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse danger rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DangerLevel {
    Low,
    Medium,
    High,
}

/// Classification result for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Timestamp of the classified frame (nanoseconds)
    pub timestamp_ns: u64,

    pub activity: ActivityLabel,

    pub confidence: f32,

    pub alert_level: AlertLevel,

    pub danger_level: DangerLevel,

    /// Continuous eye closure at this frame (seconds)
    pub eyes_closed_duration: f64,

    /// Continuous head-down time at this frame (seconds)
    pub looking_down_duration: f64,

    /// Whether this frame crosses an alarm threshold
    pub trigger_alarm: bool,

    /// Human-readable explanation
    pub reason: String,

    /// Fused signals behind the decision (absent when no driver was seen)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<FusedSignals>,
}

impl ActivityEvent {
    /// Whether the driver is in a safe, attentive state
    pub fn is_safe(&self) -> bool {
        self.alert_level == AlertLevel::Safe
    }

    /// The longest tracked danger duration at this frame (seconds)
    pub fn danger_duration(&self) -> f64 {
        self.eyes_closed_duration.max(self.looking_down_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_serializes_snake_case() {
        let json = serde_json::to_string(&ActivityLabel::SleepingEyesClosed).unwrap();
        assert_eq!(json, "\"sleeping_eyes_closed\"");
        assert_eq!(ActivityLabel::LookingLeft.to_string(), "looking_left");
    }

    #[test]
    fn test_alert_level_ordering_and_danger() {
        assert!(AlertLevel::Critical > AlertLevel::Warning);
        assert!(AlertLevel::Caution > AlertLevel::Safe);
        assert_eq!(AlertLevel::Warning.danger(), DangerLevel::High);
        assert_eq!(serde_json::to_string(&AlertLevel::Safe).unwrap(), "\"SAFE\"");
    }
}
