//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Thresholds used by per-frame signal fusion (pixels unless noted)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Landmarks below this confidence are ignored entirely
    pub landmark_floor: f32,

    /// Fused eye/head confidence needed before the boolean is reported
    pub min_fused_confidence: f32,

    /// Upper bound on any fused confidence
    pub max_fused_confidence: f32,

    /// Eye landmark confidence below which the eye is treated as closed
    pub eye_low_confidence: f32,

    /// Eye landmark confidence above which the eye counts as visible
    pub eye_visible_confidence: f32,

    /// Eye midpoint to nose vertical distance signalling closed eyes
    pub eye_nose_proximity_px: f32,

    /// Eye separation / face width ratio signalling closed eyes
    pub eye_ratio_threshold: f32,

    /// Minimum ear-to-ear width for the eye ratio test
    pub min_face_width_px: f32,

    /// Nose drop below the shoulder line signalling head down
    pub head_drop_px: f32,

    /// Drop at which the nose-drop contribution saturates (weight = drop / scale, max 0.5)
    pub head_drop_scale_px: f32,

    /// Eye midpoint below nose signalling head down
    pub eyes_below_nose_px: f32,

    /// Nose below ear midpoint signalling head down
    pub ear_nose_px: f32,

    /// Minimum drop for the forward/down ratio test
    pub forward_drop_px: f32,

    /// Drop / horizontal offset ratio signalling head down rather than forward
    pub forward_ratio: f32,

    /// Nose-to-shoulder vs shoulder-to-hip ratio for a horizontal body
    pub horizontal_ratio: f32,

    /// Shoulder width under which the driver is in profile
    pub min_shoulder_width_px: f32,

    /// Confidence reported for a profile turn
    pub profile_gaze_confidence: f32,

    /// Nose offset / half shoulder width beyond which gaze is turned
    pub gaze_offset_ratio: f32,

    /// Nose height above the shoulder line required for eyes-on-road
    pub head_up_px: f32,

    /// Confidence reported when eyes are on the road
    pub eyes_on_road_confidence: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            landmark_floor: 0.2,
            min_fused_confidence: 0.3,
            max_fused_confidence: 0.95,
            eye_low_confidence: 0.4,
            eye_visible_confidence: 0.3,
            eye_nose_proximity_px: 20.0,
            eye_ratio_threshold: 0.25,
            min_face_width_px: 10.0,
            head_drop_px: 20.0,
            head_drop_scale_px: 40.0,
            eyes_below_nose_px: 5.0,
            ear_nose_px: 15.0,
            forward_drop_px: 10.0,
            forward_ratio: 0.5,
            horizontal_ratio: 1.5,
            min_shoulder_width_px: 10.0,
            profile_gaze_confidence: 0.8,
            gaze_offset_ratio: 0.3,
            head_up_px: 20.0,
            eyes_on_road_confidence: 0.85,
        }
    }
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Continuous eye closure that raises the alarm (seconds)
    pub eyes_closed_alarm_secs: f64,

    /// Continuous head-down time that raises the alarm (seconds)
    pub head_down_alarm_secs: f64,

    /// Duration after which eye closure or head-down becomes a warning (seconds)
    pub warning_secs: f64,

    /// Minimum horizontal-body confidence for `sleeping_horizontal`
    pub horizontal_min_confidence: f32,

    /// Minimum eyes-on-road confidence for `eyes_on_road`
    pub eyes_on_road_min_confidence: f32,

    /// Minimum gaze confidence for `looking_left` / `looking_right`
    pub gaze_min_confidence: f32,

    /// Per-frame fusion thresholds
    pub fusion: FusionConfig,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            eyes_closed_alarm_secs: 5.0,
            head_down_alarm_secs: 5.0,
            warning_secs: 2.0,
            horizontal_min_confidence: 0.6,
            eyes_on_road_min_confidence: 0.6,
            gaze_min_confidence: 0.5,
            fusion: FusionConfig::default(),
        }
    }
}

impl DmsConfig {
    /// Reject non-positive or inconsistent thresholds
    pub fn validate(&self) -> Result<(), DmsError> {
        let durations = [
            ("eyes_closed_alarm_secs", self.eyes_closed_alarm_secs),
            ("head_down_alarm_secs", self.head_down_alarm_secs),
            ("warning_secs", self.warning_secs),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value <= 0.0 {
                return Err(DmsError::Config(format!("{} must be positive, got {}", name, value)));
            }
        }

        if self.warning_secs >= self.eyes_closed_alarm_secs
            || self.warning_secs >= self.head_down_alarm_secs
        {
            return Err(DmsError::Config(format!(
                "warning_secs ({}) must be below both alarm thresholds",
                self.warning_secs
            )));
        }

        let f = &self.fusion;
        let positive = [
            ("horizontal_min_confidence", self.horizontal_min_confidence),
            ("eyes_on_road_min_confidence", self.eyes_on_road_min_confidence),
            ("gaze_min_confidence", self.gaze_min_confidence),
            ("fusion.landmark_floor", f.landmark_floor),
            ("fusion.min_fused_confidence", f.min_fused_confidence),
            ("fusion.max_fused_confidence", f.max_fused_confidence),
            ("fusion.eye_low_confidence", f.eye_low_confidence),
            ("fusion.eye_visible_confidence", f.eye_visible_confidence),
            ("fusion.eye_nose_proximity_px", f.eye_nose_proximity_px),
            ("fusion.eye_ratio_threshold", f.eye_ratio_threshold),
            ("fusion.min_face_width_px", f.min_face_width_px),
            ("fusion.head_drop_px", f.head_drop_px),
            ("fusion.head_drop_scale_px", f.head_drop_scale_px),
            ("fusion.eyes_below_nose_px", f.eyes_below_nose_px),
            ("fusion.ear_nose_px", f.ear_nose_px),
            ("fusion.forward_drop_px", f.forward_drop_px),
            ("fusion.forward_ratio", f.forward_ratio),
            ("fusion.horizontal_ratio", f.horizontal_ratio),
            ("fusion.min_shoulder_width_px", f.min_shoulder_width_px),
            ("fusion.profile_gaze_confidence", f.profile_gaze_confidence),
            ("fusion.gaze_offset_ratio", f.gaze_offset_ratio),
            ("fusion.head_up_px", f.head_up_px),
            ("fusion.eyes_on_road_confidence", f.eyes_on_road_confidence),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(DmsError::Config(format!("{} must be positive, got {}", name, value)));
            }
        }

        if f.max_fused_confidence > 1.0 {
            return Err(DmsError::Config(format!(
                "fusion.max_fused_confidence must not exceed 1.0, got {}",
                f.max_fused_confidence
            )));
        }

        Ok(())
    }
}
