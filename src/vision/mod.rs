//! Boundaries to the perception stack.
//!
//! Frame capture, detection and tracking are external collaborators. Each one
//! sits behind a trait so the sampling loop only ever sees confirmed tracks.
//! The concrete adapters here replay recorded material: an image directory or
//! blank frames as the source, detections exported from a model run, and a
//! lightweight IoU tracker with DeepSort-style confirmation.

pub mod annotate;
pub mod replay;
pub mod scripted;
pub mod source;
pub mod tracker;
pub mod types;

use anyhow::Result;
use thiserror::Error;

pub use replay::ReplayDetector;
pub use source::{BlankSource, ImageSequenceSource};
pub use tracker::{IouTracker, TrackerSettings};
pub use types::{BBox, Detection, Frame, Track, TrackId, PERSON_CLASS};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("frame source exhausted")]
    Exhausted,
    #[error("failed to read frame {path}: {message}")]
    Read { path: String, message: String },
    #[error("frame source failed: {0}")]
    Device(String),
}

/// Yields consecutive frames. A failure ends the capture loop.
pub trait FrameSource {
    fn grab(&mut self) -> Result<Frame, CaptureError>;
}

/// Maps one frame to boxes of the requested classes.
pub trait Detector {
    fn detect(&mut self, frame: &Frame, classes: &[u32]) -> Result<Vec<Detection>>;
}

/// Associates per-frame detections with identities that persist across frames.
pub trait Tracker {
    fn update(&mut self, detections: &[Detection], frame: &Frame) -> Vec<Track>;
}

/// What one capture cycle produced.
pub struct Observation {
    pub frame: Frame,
    pub detections: usize,
    pub tracks: Vec<Track>,
}

impl Observation {
    pub fn confirmed(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|track| track.confirmed)
    }
}

#[derive(Debug)]
pub enum StepError {
    /// The source could not produce a frame; the loop should stop.
    Capture(CaptureError),
    /// A frame was captured but detection failed; the sample is skipped.
    Detect(anyhow::Error),
}

/// Source, detector and tracker wired in sequence.
pub struct Perception {
    source: Box<dyn FrameSource + Send>,
    detector: Box<dyn Detector + Send>,
    tracker: Box<dyn Tracker + Send>,
    classes: Vec<u32>,
    min_confidence: f32,
}

impl Perception {
    pub fn new(
        source: Box<dyn FrameSource + Send>,
        detector: Box<dyn Detector + Send>,
        tracker: Box<dyn Tracker + Send>,
    ) -> Self {
        Self {
            source,
            detector,
            tracker,
            classes: vec![PERSON_CLASS],
            min_confidence: 0.0,
        }
    }

    pub fn with_classes(mut self, classes: Vec<u32>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn step(&mut self) -> Result<Observation, StepError> {
        let frame = self.source.grab().map_err(StepError::Capture)?;

        let detections: Vec<Detection> = self
            .detector
            .detect(&frame, &self.classes)
            .map_err(StepError::Detect)?
            .into_iter()
            .filter(|det| det.confidence >= self.min_confidence)
            .collect();

        let tracks = self.tracker.update(&detections, &frame);

        Ok(Observation {
            detections: detections.len(),
            frame,
            tracks,
        })
    }
}
