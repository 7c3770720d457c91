//! Canned perception for driving sessions without a camera or model.

use std::collections::VecDeque;

use anyhow::Result;

use super::{BBox, BlankSource, Detection, Detector, Frame, Perception, Track, TrackId, Tracker};

/// Detector that never sees anything.
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&mut self, _frame: &Frame, _classes: &[u32]) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// Tracker that replays a fixed list of per-frame outputs, one per call.
pub struct ScriptedTracker {
    frames: VecDeque<Vec<Track>>,
}

impl ScriptedTracker {
    pub fn new(frames: Vec<Vec<Track>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl Tracker for ScriptedTracker {
    fn update(&mut self, _detections: &[Detection], _frame: &Frame) -> Vec<Track> {
        self.frames.pop_front().unwrap_or_default()
    }
}

/// A confirmed track whose centroid lands exactly on `(cx, cy)`.
pub fn confirmed_at(id: u64, cx: i64, cy: i64) -> Track {
    let (x, y) = (cx as f32, cy as f32);
    Track {
        id: TrackId(id),
        bbox: BBox::new(x - 10.0, y - 20.0, x + 10.0, y + 20.0),
        confirmed: true,
    }
}

/// Perception that yields one blank frame per scripted entry and then
/// reports the source as exhausted.
pub fn scripted_perception(frames: Vec<Vec<Track>>) -> Perception {
    let count = frames.len() as u64;
    Perception::new(
        Box::new(BlankSource::new(16, 16).with_limit(count)),
        Box::new(NullDetector),
        Box::new(ScriptedTracker::new(frames)),
    )
}
