use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{Detection, Detector, Frame};

#[derive(Debug, Deserialize)]
struct DetectionLine {
    frame: u64,
    #[serde(default)]
    boxes: Vec<Detection>,
}

/// Serves detections recorded from an earlier model run, keyed by frame index.
///
/// Input is JSON lines: `{"frame": 12, "boxes": [{"x1":..,"y1":..,"x2":..,"y2":..,"confidence":..,"class_id":0}]}`.
/// Frames with no line yield no detections.
#[derive(Debug, Default)]
pub struct ReplayDetector {
    frames: HashMap<u64, Vec<Detection>>,
}

impl ReplayDetector {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detections from {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("invalid detections file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut frames: HashMap<u64, Vec<Detection>> = HashMap::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed: DetectionLine = serde_json::from_str(line)
                .with_context(|| format!("line {}", line_no + 1))?;
            frames.entry(parsed.frame).or_default().extend(parsed.boxes);
        }
        Ok(Self { frames })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, frame: &Frame, classes: &[u32]) -> Result<Vec<Detection>> {
        Ok(self
            .frames
            .get(&frame.index)
            .map(|boxes| {
                boxes
                    .iter()
                    .filter(|det| classes.is_empty() || classes.contains(&det.class_id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}
