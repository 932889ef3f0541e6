//! Landmark sources

use std::collections::VecDeque;
use std::io::BufRead;

use tracing::debug;

use crate::{PoseError, PoseFrame};

/// Producer of pose frames, called once per processed image.
///
/// `Ok(None)` means the source is exhausted. A frame without landmarks
/// means no person was detected in that image.
pub trait LandmarkSource {
    fn get_frame(&mut self) -> Result<Option<PoseFrame>, PoseError>;
}

/// In-memory source replaying a fixed list of frames
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    frames: VecDeque<PoseFrame>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = PoseFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl LandmarkSource for ReplaySource {
    fn get_frame(&mut self) -> Result<Option<PoseFrame>, PoseError> {
        Ok(self.frames.pop_front())
    }
}

/// Source reading one JSON-encoded `PoseFrame` per line.
///
/// Blank lines are skipped. Timestamps must not go backwards.
pub struct JsonLinesSource<R> {
    reader: R,
    line: usize,
    last_timestamp_ns: Option<u64>,
    buf: String,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            last_timestamp_ns: None,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> LandmarkSource for JsonLinesSource<R> {
    fn get_frame(&mut self) -> Result<Option<PoseFrame>, PoseError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                debug!("Landmark stream exhausted after {} lines", self.line);
                return Ok(None);
            }
            self.line += 1;

            let trimmed = self.buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            let frame: PoseFrame =
                serde_json::from_str(trimmed).map_err(|e| PoseError::Malformed {
                    line: self.line,
                    reason: e.to_string(),
                })?;

            if let Some(previous_ns) = self.last_timestamp_ns {
                if frame.timestamp_ns < previous_ns {
                    return Err(PoseError::NonMonotonic {
                        previous_ns,
                        current_ns: frame.timestamp_ns,
                    });
                }
            }
            self.last_timestamp_ns = Some(frame.timestamp_ns);

            return Ok(Some(frame));
        }
    }
}
