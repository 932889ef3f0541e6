//! Per-frame signal fusion from pose landmarks
//!
//! Each judgment OR-combines independent heuristic tests. Every test that
//! fires adds a fixed weight; the sum is capped. Tests whose landmarks are
//! missing or below the landmark floor are skipped, never counted as evidence.

use pose_capture::{midpoint, Keypoint, Landmark, PoseFrame};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::FusionConfig;

const W_EYES_LOW_CONFIDENCE: f32 = 0.40;
const W_EYES_NOSE_PROXIMITY: f32 = 0.30;
const W_EYES_RATIO: f32 = 0.20;
const W_EYES_NOT_VISIBLE: f32 = 0.35;

const W_HEAD_DROP_MAX: f32 = 0.50;
const W_HEAD_EYES_BELOW_NOSE: f32 = 0.25;
const W_HEAD_EAR_NOSE: f32 = 0.30;
const W_HEAD_FORWARD_RATIO: f32 = 0.20;

const GAZE_TURN_MAX_CONFIDENCE: f32 = 0.9;
const GAZE_FORWARD_CONFIDENCE: f32 = 0.5;
const HORIZONTAL_MAX_CONFIDENCE: f32 = 0.95;

/// Gaze (head turn) direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    #[default]
    Forward,
    Left,
    Right,
}

/// Fused per-frame judgments
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedSignals {
    pub eyes_closed: bool,
    pub eyes_closed_confidence: f32,
    pub head_down: bool,
    pub head_down_confidence: f32,
    pub body_horizontal: bool,
    pub body_horizontal_confidence: f32,
    pub gaze_direction: GazeDirection,
    pub gaze_confidence: f32,
    pub eyes_on_road: bool,
    pub eyes_on_road_confidence: f32,
}

/// Accumulated evidence for one judgment
#[derive(Debug, Default)]
struct Evidence {
    fired: bool,
    score: f32,
}

impl Evidence {
    fn add(&mut self, weight: f32) {
        self.fired = true;
        self.score += weight;
    }

    fn capped(&self, cap: f32) -> f32 {
        self.score.min(cap)
    }
}

/// Shoulder geometry shared by head, gaze and posture tests
struct Shoulders {
    center_x: f32,
    center_y: f32,
    width: f32,
}

impl Shoulders {
    fn new(left: &Landmark, right: &Landmark) -> Self {
        let (center_x, center_y) = midpoint(left, right);
        Self {
            center_x,
            center_y,
            width: (right.x - left.x).abs(),
        }
    }
}

/// Stateless fusion of landmark heuristics into driver signals
#[derive(Debug, Clone, Default)]
pub struct SignalFusion {
    config: FusionConfig,
}

impl SignalFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse every judgment for one frame
    pub fn fuse(&self, frame: &PoseFrame) -> FusedSignals {
        let (eyes_closed, eyes_closed_confidence) = self.eyes_closed(frame);
        let (head_down, head_down_confidence) = self.head_down(frame);
        let (body_horizontal, body_horizontal_confidence) = self.body_horizontal(frame);
        let (gaze_direction, gaze_confidence) = self.gaze(frame);
        let (eyes_on_road, eyes_on_road_confidence) = self.eyes_on_road(frame);

        let signals = FusedSignals {
            eyes_closed,
            eyes_closed_confidence,
            head_down,
            head_down_confidence,
            body_horizontal,
            body_horizontal_confidence,
            gaze_direction,
            gaze_confidence,
            eyes_on_road,
            eyes_on_road_confidence,
        };
        trace!(?signals, "Fused frame at {}ns", frame.timestamp_ns);
        signals
    }

    fn usable<'a>(&self, frame: &'a PoseFrame, keypoint: Keypoint) -> Option<&'a Landmark> {
        frame.usable(keypoint, self.config.landmark_floor)
    }

    fn shoulders(&self, frame: &PoseFrame) -> Option<Shoulders> {
        let left = self.usable(frame, Keypoint::LeftShoulder)?;
        let right = self.usable(frame, Keypoint::RightShoulder)?;
        Some(Shoulders::new(left, right))
    }

    /// Eyes-closed judgment and confidence
    pub fn eyes_closed(&self, frame: &PoseFrame) -> (bool, f32) {
        let c = &self.config;
        let Some(nose) = self.usable(frame, Keypoint::Nose) else {
            return (false, 0.0);
        };

        let left_eye = self.usable(frame, Keypoint::LeftEye);
        let right_eye = self.usable(frame, Keypoint::RightEye);
        let left_conf = frame.confidence(Keypoint::LeftEye);
        let right_conf = frame.confidence(Keypoint::RightEye);

        let mut evidence = Evidence::default();

        if left_conf < c.eye_low_confidence && right_conf < c.eye_low_confidence {
            evidence.add(W_EYES_LOW_CONFIDENCE);
        }

        if let (Some(le), Some(re)) = (left_eye, right_eye) {
            let (_, eye_mid_y) = midpoint(le, re);
            if (eye_mid_y - nose.y).abs() < c.eye_nose_proximity_px {
                evidence.add(W_EYES_NOSE_PROXIMITY);
            }

            let ears = (
                self.usable(frame, Keypoint::LeftEar),
                self.usable(frame, Keypoint::RightEar),
            );
            if let (Some(lear), Some(rear)) = ears {
                let face_width = (lear.x - rear.x).abs();
                if face_width > c.min_face_width_px {
                    let eye_ratio = (le.x - re.x).abs() / face_width;
                    if eye_ratio < c.eye_ratio_threshold {
                        evidence.add(W_EYES_RATIO);
                    }
                }
            }
        }

        let left_visible = left_eye.is_some() && left_conf > c.eye_visible_confidence;
        let right_visible = right_eye.is_some() && right_conf > c.eye_visible_confidence;
        if !left_visible && !right_visible {
            evidence.add(W_EYES_NOT_VISIBLE);
        }

        let confidence = evidence.capped(c.max_fused_confidence);
        if evidence.fired && confidence >= c.min_fused_confidence {
            (true, confidence)
        } else {
            (false, 0.0)
        }
    }

    /// Head-down judgment and confidence
    pub fn head_down(&self, frame: &PoseFrame) -> (bool, f32) {
        let c = &self.config;
        let (Some(nose), Some(shoulders)) = (self.usable(frame, Keypoint::Nose), self.shoulders(frame))
        else {
            return (false, 0.0);
        };

        let mut evidence = Evidence::default();
        let drop = nose.y - shoulders.center_y;

        if drop > c.head_drop_px {
            evidence.add((drop / c.head_drop_scale_px).min(W_HEAD_DROP_MAX));
        }

        let eyes = (
            self.usable(frame, Keypoint::LeftEye),
            self.usable(frame, Keypoint::RightEye),
        );
        if let (Some(le), Some(re)) = eyes {
            let (_, eye_mid_y) = midpoint(le, re);
            if eye_mid_y - nose.y > c.eyes_below_nose_px {
                evidence.add(W_HEAD_EYES_BELOW_NOSE);
            }
        }

        let ears = (
            self.usable(frame, Keypoint::LeftEar),
            self.usable(frame, Keypoint::RightEar),
        );
        if let (Some(lear), Some(rear)) = ears {
            let (_, ear_mid_y) = midpoint(lear, rear);
            if nose.y - ear_mid_y > c.ear_nose_px {
                evidence.add(W_HEAD_EAR_NOSE);
            }
        }

        if drop > c.forward_drop_px {
            let ratio = drop / ((nose.x - shoulders.center_x).abs() + 1.0);
            if ratio > c.forward_ratio {
                evidence.add(W_HEAD_FORWARD_RATIO);
            }
        }

        let confidence = evidence.capped(c.max_fused_confidence);
        if evidence.fired && confidence > c.min_fused_confidence {
            (true, confidence)
        } else {
            (false, 0.0)
        }
    }

    /// Reclined / horizontal body judgment and confidence
    pub fn body_horizontal(&self, frame: &PoseFrame) -> (bool, f32) {
        let (Some(nose), Some(shoulders)) = (self.usable(frame, Keypoint::Nose), self.shoulders(frame))
        else {
            return (false, 0.0);
        };

        let hip_y = match (
            self.usable(frame, Keypoint::LeftHip),
            self.usable(frame, Keypoint::RightHip),
        ) {
            (Some(l), Some(r)) => (l.y + r.y) / 2.0,
            (Some(h), None) | (None, Some(h)) => h.y,
            (None, None) => return (false, 0.0),
        };

        let vertical = (nose.y - shoulders.center_y).abs();
        let span = (shoulders.center_y - hip_y).abs();
        // Hips on the shoulder line give no torso to compare against
        if span <= 0.0 {
            return (false, 0.0);
        }
        let ratio = vertical / (span + 1.0);

        if ratio > self.config.horizontal_ratio {
            (true, (ratio / 2.0).min(HORIZONTAL_MAX_CONFIDENCE))
        } else {
            (false, 0.0)
        }
    }

    /// Gaze direction and confidence
    pub fn gaze(&self, frame: &PoseFrame) -> (GazeDirection, f32) {
        let c = &self.config;
        let (Some(nose), Some(left), Some(right)) = (
            self.usable(frame, Keypoint::Nose),
            self.usable(frame, Keypoint::LeftShoulder),
            self.usable(frame, Keypoint::RightShoulder),
        ) else {
            return (GazeDirection::Forward, 0.0);
        };
        let shoulders = Shoulders::new(left, right);

        if shoulders.width < c.min_shoulder_width_px {
            let direction = if left.x > right.x {
                GazeDirection::Right
            } else {
                GazeDirection::Left
            };
            return (direction, c.profile_gaze_confidence);
        }

        let offset_ratio = (nose.x - shoulders.center_x) / (shoulders.width / 2.0);
        if offset_ratio > c.gaze_offset_ratio {
            (GazeDirection::Right, offset_ratio.abs().min(GAZE_TURN_MAX_CONFIDENCE))
        } else if offset_ratio < -c.gaze_offset_ratio {
            (GazeDirection::Left, offset_ratio.abs().min(GAZE_TURN_MAX_CONFIDENCE))
        } else {
            (GazeDirection::Forward, GAZE_FORWARD_CONFIDENCE)
        }
    }

    /// Eyes-on-road judgment: facing forward with the head up
    pub fn eyes_on_road(&self, frame: &PoseFrame) -> (bool, f32) {
        let c = &self.config;
        let (Some(nose), Some(shoulders)) = (self.usable(frame, Keypoint::Nose), self.shoulders(frame))
        else {
            return (false, 0.0);
        };

        if shoulders.width < c.min_shoulder_width_px {
            return (false, 0.0);
        }

        let offset_ratio = (nose.x - shoulders.center_x).abs() / (shoulders.width / 2.0);
        let head_up = shoulders.center_y - nose.y > c.head_up_px;

        if offset_ratio < c.gaze_offset_ratio && head_up {
            (true, c.eyes_on_road_confidence)
        } else {
            (false, 0.0)
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Synthetic driver poses in a 640x480 frame

    use pose_capture::{Keypoint, Landmark, PoseFrame};

    /// Upright driver looking straight ahead with open eyes
    pub fn upright(timestamp_ns: u64) -> PoseFrame {
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

    /// Upright pose whose eye landmarks have collapsed below the floor
    pub fn eyes_closed(timestamp_ns: u64) -> PoseFrame {
        let mut frame = upright(timestamp_ns);
        set(&mut frame, Keypoint::LeftEye, None, Some(0.1));
        set(&mut frame, Keypoint::RightEye, None, Some(0.1));
        frame
    }

    /// Driver with the head dropped below the shoulder line
    pub fn head_down(timestamp_ns: u64) -> PoseFrame {
        let mut frame = upright(timestamp_ns);
        set(&mut frame, Keypoint::Nose, Some((320.0, 340.0)), None);
        set(&mut frame, Keypoint::LeftEye, Some((300.0, 310.0)), None);
        set(&mut frame, Keypoint::RightEye, Some((340.0, 310.0)), None);
        set(&mut frame, Keypoint::LeftEar, Some((270.0, 320.0)), None);
        set(&mut frame, Keypoint::RightEar, Some((370.0, 320.0)), None);
        frame
    }

    /// Head down and eyes closed at once
    pub fn head_down_eyes_closed(timestamp_ns: u64) -> PoseFrame {
        let mut frame = head_down(timestamp_ns);
        set(&mut frame, Keypoint::LeftEye, None, Some(0.1));
        set(&mut frame, Keypoint::RightEye, None, Some(0.1));
        frame
    }

    /// Upright driver with the head turned to the image right
    pub fn turned_right(timestamp_ns: u64) -> PoseFrame {
        let mut frame = upright(timestamp_ns);
        set(&mut frame, Keypoint::Nose, Some((370.0, 210.0)), None);
        frame
    }

    /// Reclined driver: nose far from the shoulder line, short torso span
    pub fn reclined(timestamp_ns: u64) -> PoseFrame {
        PoseFrame::new(
            vec![
                Landmark::new(Keypoint::Nose, 320.0, 150.0, 0.9),
                Landmark::new(Keypoint::LeftEye, 300.0, 120.0, 0.9),
                Landmark::new(Keypoint::RightEye, 340.0, 120.0, 0.9),
                Landmark::new(Keypoint::LeftShoulder, 250.0, 300.0, 0.9),
                Landmark::new(Keypoint::RightShoulder, 390.0, 300.0, 0.9),
                Landmark::new(Keypoint::LeftHip, 260.0, 340.0, 0.7),
            ],
            timestamp_ns,
        )
    }

    pub fn set(
        frame: &mut PoseFrame,
        keypoint: Keypoint,
        position: Option<(f32, f32)>,
        confidence: Option<f32>,
    ) {
        if let Some(l) = frame.landmarks.iter_mut().find(|l| l.keypoint == keypoint) {
            if let Some((x, y)) = position {
                l.x = x;
                l.y = y;
            }
            if confidence.is_some() {
                l.confidence = confidence;
            }
        }
    }

    pub fn remove(frame: &mut PoseFrame, keypoint: Keypoint) {
        frame.landmarks.retain(|l| l.keypoint != keypoint);
    }
}
