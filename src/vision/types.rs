use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// COCO class index for "person".
pub const PERSON_CLASS: u32 = 0;

/// Tracker-assigned identity.
///
/// Stable only while a track stays alive within one session; a restart hands
/// out the same numbers again to whoever shows up first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TrackId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Axis-aligned box in image coordinates, (left, top, right, bottom).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Integer centroid, truncated the same way pixel coordinates are.
    pub fn centroid(&self) -> (i64, i64) {
        (
            ((self.x1 + self.x2) / 2.0) as i64,
            ((self.y1 + self.y2) / 2.0) as i64,
        )
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detector output box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BBox,
    pub confidence: f32,
    #[serde(default)]
    pub class_id: u32,
}

/// One tracker output: an identity, its current box, and whether the
/// tracker has seen it long enough to vouch for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub bbox: BBox,
    pub confirmed: bool,
}

/// A captured image plus its position in the stream.
#[derive(Clone)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn blank(index: u64, width: u32, height: u32) -> Self {
        Self {
            index,
            image: RgbImage::new(width, height),
        }
    }
}
