//! Pose frame types and landmark geometry

use serde::{Deserialize, Serialize};

/// Number of named body points produced by the pose model
pub const KEYPOINT_COUNT: usize = 17;

/// Named body point, in pose-model index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keypoint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Keypoint {
    /// All keypoints in model index order
    pub const ALL: [Keypoint; KEYPOINT_COUNT] = [
        Keypoint::Nose,
        Keypoint::LeftEye,
        Keypoint::RightEye,
        Keypoint::LeftEar,
        Keypoint::RightEar,
        Keypoint::LeftShoulder,
        Keypoint::RightShoulder,
        Keypoint::LeftElbow,
        Keypoint::RightElbow,
        Keypoint::LeftWrist,
        Keypoint::RightWrist,
        Keypoint::LeftHip,
        Keypoint::RightHip,
        Keypoint::LeftKnee,
        Keypoint::RightKnee,
        Keypoint::LeftAnkle,
        Keypoint::RightAnkle,
    ];

    /// Index of this keypoint in the model output
    pub fn index(self) -> usize {
        self as usize
    }

    /// Keypoint for a model output index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// A single 2-D landmark in image coordinates (y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub keypoint: Keypoint,
    pub x: f32,
    pub y: f32,
    /// Model confidence in [0, 1], if the source reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Landmark {
    pub fn new(keypoint: Keypoint, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            keypoint,
            x,
            y,
            confidence: Some(confidence),
        }
    }

    /// Landmark without a confidence value
    pub fn unscored(keypoint: Keypoint, x: f32, y: f32) -> Self {
        Self {
            keypoint,
            x,
            y,
            confidence: None,
        }
    }

    /// Whether the landmark clears a confidence floor.
    /// Landmarks without a confidence value are taken at face value.
    pub fn passes(&self, floor: f32) -> bool {
        self.confidence.map_or(true, |c| c >= floor)
    }
}

/// One processed frame of pose landmarks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Detected landmarks; absent points are simply missing
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    /// Monotonic capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
}

impl PoseFrame {
    /// Create a frame from landmarks
    pub fn new(landmarks: Vec<Landmark>, timestamp_ns: u64) -> Self {
        Self {
            landmarks,
            timestamp_ns,
        }
    }

    /// Frame in which no person was detected
    pub fn empty(timestamp_ns: u64) -> Self {
        Self {
            landmarks: Vec::new(),
            timestamp_ns,
        }
    }

    /// Whether the frame contains no landmarks at all
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Get a landmark regardless of its confidence (first occurrence wins)
    pub fn get(&self, keypoint: Keypoint) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.keypoint == keypoint)
    }

    /// Get a landmark only if it clears the confidence floor
    pub fn usable(&self, keypoint: Keypoint, floor: f32) -> Option<&Landmark> {
        self.get(keypoint).filter(|l| l.passes(floor))
    }

    /// Raw confidence for a keypoint; missing points and missing scores read as 0
    pub fn confidence(&self, keypoint: Keypoint) -> f32 {
        self.get(keypoint).and_then(|l| l.confidence).unwrap_or(0.0)
    }
}

/// Midpoint of two landmarks
pub fn midpoint(a: &Landmark, b: &Landmark) -> (f32, f32) {
    ((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keypoint_index_round_trip() {
        for (i, kp) in Keypoint::ALL.iter().enumerate() {
            assert_eq!(kp.index(), i);
            assert_eq!(Keypoint::from_index(i), Some(*kp));
        }
        assert_eq!(Keypoint::from_index(KEYPOINT_COUNT), None);
    }

    #[test]
    fn test_usable_respects_floor() {
        let frame = PoseFrame::new(
            vec![
                Landmark::new(Keypoint::Nose, 10.0, 10.0, 0.15),
                Landmark::unscored(Keypoint::LeftEye, 5.0, 5.0),
            ],
            0,
        );

        assert!(frame.get(Keypoint::Nose).is_some());
        assert!(frame.usable(Keypoint::Nose, 0.2).is_none());
        assert!(frame.usable(Keypoint::LeftEye, 0.2).is_some());
        assert_eq!(frame.confidence(Keypoint::LeftEye), 0.0);
        assert_eq!(frame.confidence(Keypoint::RightEye), 0.0);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"timestamp_ns":5,"landmarks":[{"keypoint":"left_shoulder","x":1.0,"y":2.0,"confidence":0.5}]}"#;
        let frame: PoseFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.get(Keypoint::LeftShoulder).map(|l| l.y), Some(2.0));
    }

    proptest! {
        #[test]
        fn prop_confidence_floor(confidence in 0.0f32..=1.0, floor in 0.0f32..=1.0) {
            let frame = PoseFrame::new(
                vec![
                    Landmark::new(Keypoint::Nose, 320.0, 200.0, confidence),
                    Landmark::unscored(Keypoint::LeftEye, 300.0, 180.0),
                ],
                0,
            );

            prop_assert_eq!(frame.usable(Keypoint::Nose, floor).is_some(), confidence >= floor);
            prop_assert!(frame.usable(Keypoint::LeftEye, floor).is_some());
            prop_assert!(frame.usable(Keypoint::RightEye, floor).is_none());
            prop_assert_eq!(frame.confidence(Keypoint::Nose), confidence);
        }
    }
}
