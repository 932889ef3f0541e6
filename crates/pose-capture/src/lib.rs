//! Pose Capture Library for Driver Monitoring
//!
//! Landmark data model consumed by the driver monitoring pipeline.
//! Pose estimation itself happens upstream; this crate provides:
//! - 17-point pose frames with optional per-landmark confidence
//! - The `LandmarkSource` contract for frame producers
//! - Replay sources for recorded sessions and tests

pub mod frame;
pub mod source;

pub use frame::{midpoint, Keypoint, Landmark, PoseFrame, KEYPOINT_COUNT};
pub use source::{JsonLinesSource, LandmarkSource, ReplaySource};

use thiserror::Error;

/// Pose capture error types
#[derive(Error, Debug)]
pub enum PoseError {
    #[error("Failed to read landmark stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed pose frame on line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Timestamp went backwards: {previous_ns} -> {current_ns}")]
    NonMonotonic { previous_ns: u64, current_ns: u64 },
}
