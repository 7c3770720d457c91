use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_polygon_mut, draw_hollow_rect_mut},
    point::Point,
    rect::Rect,
};

use super::{Frame, Track};
use crate::zones::{ZoneSet, ZoneShape};

const ZONE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const TRACK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

// None when the box cannot be expressed in imageproc's i32 pixel space.
fn rect_from_corners(x1: i64, y1: i64, x2: i64, y2: i64) -> Option<Rect> {
    let left = i32::try_from(x1).ok()?;
    let top = i32::try_from(y1).ok()?;
    let width = i32::try_from(x2.checked_sub(x1)?).ok().filter(|w| *w >= 0)?.max(1);
    let height = i32::try_from(y2.checked_sub(y1)?).ok().filter(|h| *h >= 0)?.max(1);
    if left.checked_add(width).is_none() || top.checked_add(height).is_none() {
        return None;
    }
    Some(Rect::at(left, top).of_size(width.unsigned_abs(), height.unsigned_abs()))
}

/// Draws zone outlines and confirmed track boxes onto a copy of the frame.
pub fn annotate(frame: &Frame, zones: &ZoneSet, tracks: &[Track]) -> RgbImage {
    let mut canvas = frame.image.clone();

    for zone in zones.iter() {
        match &zone.shape {
            ZoneShape::Rect { x1, y1, x2, y2 } => {
                if let Some(rect) = rect_from_corners(*x1, *y1, *x2, *y2) {
                    draw_hollow_rect_mut(&mut canvas, rect, ZONE_COLOR);
                }
            }
            ZoneShape::Polygon { points } => {
                let mut poly: Vec<Point<f32>> = points
                    .iter()
                    .map(|(x, y)| Point::new(*x as f32, *y as f32))
                    .collect();
                // imageproc closes the outline itself.
                if poly.len() > 1 && poly.first() == poly.last() {
                    poly.pop();
                }
                if poly.len() >= 3 {
                    draw_hollow_polygon_mut(&mut canvas, &poly, ZONE_COLOR);
                }
            }
        }
    }

    for track in tracks.iter().filter(|track| track.confirmed) {
        let b = track.bbox;
        if let Some(rect) = rect_from_corners(b.x1 as i64, b.y1 as i64, b.x2 as i64, b.y2 as i64) {
            draw_hollow_rect_mut(&mut canvas, rect, TRACK_COLOR);
        }
    }

    canvas
}

/// Writes annotated frames as `frame_000042.png` under a directory.
pub struct FrameAnnotator {
    dir: PathBuf,
}

impl FrameAnnotator {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create annotation directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn write(&self, frame: &Frame, zones: &ZoneSet, tracks: &[Track]) -> Result<PathBuf> {
        let path = self.dir.join(format!("frame_{:06}.png", frame.index));
        annotate(frame, zones, tracks)
            .save(&path)
            .with_context(|| format!("failed to write annotated frame {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{BBox, TrackId};
    use crate::zones::ZoneDefinition;

    #[test]
    fn draws_zone_and_confirmed_tracks_only() {
        let frame = Frame::blank(0, 40, 40);
        let zones = ZoneSet::new(vec![ZoneDefinition::rect("z", 2, 2, 10, 10)]).unwrap();
        let tracks = [
            Track {
                id: TrackId(1),
                bbox: BBox::new(20.0, 20.0, 30.0, 30.0),
                confirmed: true,
            },
            Track {
                id: TrackId(2),
                bbox: BBox::new(32.0, 2.0, 38.0, 8.0),
                confirmed: false,
            },
        ];

        let out = annotate(&frame, &zones, &tracks);
        assert_eq!(*out.get_pixel(2, 2), ZONE_COLOR);
        assert_eq!(*out.get_pixel(20, 20), TRACK_COLOR);
        assert_eq!(*out.get_pixel(32, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn writes_numbered_png() {
        let dir = tempfile::tempdir().unwrap();
        let annotator = FrameAnnotator::new(&dir.path().join("annotated")).unwrap();
        let path = annotator
            .write(&Frame::blank(42, 8, 8), &ZoneSet::default(), &[])
            .unwrap();
        assert!(path.ends_with("frame_000042.png"));
        assert!(path.exists());
    }

    #[test]
    fn unrepresentable_boxes_are_skipped() {
        assert!(rect_from_corners(i64::MIN / 2 - 1, 0, i64::MAX / 2 + 1, 10).is_none());
        assert!(rect_from_corners(0, 0, i64::from(i32::MAX) + 1, 10).is_none());
        assert!(rect_from_corners(i64::from(i32::MIN), 0, i64::from(i32::MAX), 10).is_none());
        assert!(rect_from_corners(10, 0, 5, 10).is_none());

        let rect = rect_from_corners(-5, 2, 5, 2).unwrap();
        assert_eq!((rect.left(), rect.top(), rect.width(), rect.height()), (-5, 2, 10, 1));
    }

    #[test]
    fn huge_track_box_does_not_disturb_the_frame() {
        let frame = Frame::blank(0, 16, 16);
        let tracks = [Track {
            id: TrackId(1),
            bbox: BBox::new(-1.0e30, -1.0e30, 1.0e30, 1.0e30),
            confirmed: true,
        }];
        let out = annotate(&frame, &ZoneSet::default(), &tracks);
        assert!(out.pixels().all(|px| *px == Rgb([0, 0, 0])));
    }
}
