use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use super::{CaptureError, Frame, FrameSource};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Plays back a directory of still images in file-name order.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to list frames in {}", dir.display()))?
            .map(|entry| entry.map(|e| e.path()));
        let paths = frame_paths(dir, entries)?;

        Ok(Self { paths, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Image files among `entries`, sorted. An unreadable entry fails the whole
/// listing so playback never silently skips frames.
fn frame_paths(
    dir: &Path,
    entries: impl IntoIterator<Item = io::Result<PathBuf>>,
) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in entries {
        let path =
            entry.with_context(|| format!("failed to read an entry in {}", dir.display()))?;
        if is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Err(CaptureError::Exhausted);
        };

        let image = image::open(path).map_err(|err| CaptureError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

        let frame = Frame::new(self.cursor as u64, image.to_rgb8());
        self.cursor += 1;
        Ok(frame)
    }
}

/// Produces black frames of a fixed size, for driving the pipeline from
/// recorded detections alone.
pub struct BlankSource {
    width: u32,
    height: u32,
    limit: Option<u64>,
    next: u64,
}

impl BlankSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            limit: None,
            next: 0,
        }
    }

    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }
}

impl FrameSource for BlankSource {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        if self.limit.is_some_and(|limit| self.next >= limit) {
            return Err(CaptureError::Exhausted);
        }
        let frame = Frame::blank(self.next, self.width, self.height);
        self.next += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn blank_source_stops_at_limit() {
        let mut source = BlankSource::new(8, 6).with_limit(2);
        let first = source.grab().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.image.dimensions(), (8, 6));
        assert_eq!(source.grab().unwrap().index, 1);
        assert!(matches!(source.grab(), Err(CaptureError::Exhausted)));
    }

    #[test]
    fn image_sequence_reads_sorted_images_only() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 4).save(dir.path().join("b.png")).unwrap();
        RgbImage::new(2, 2).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.grab().unwrap();
        assert_eq!(first.image.dimensions(), (2, 2));
        let second = source.grab().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.image.dimensions(), (4, 4));
        assert!(matches!(source.grab(), Err(CaptureError::Exhausted)));
    }

    #[test]
    fn unreadable_image_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert!(matches!(source.grab(), Err(CaptureError::Read { .. })));
    }

    #[test]
    fn unreadable_entry_fails_the_listing() {
        let dir = Path::new("frames");
        let entries = vec![
            Ok(dir.join("a.png")),
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            Ok(dir.join("b.png")),
        ];
        let err = frame_paths(dir, entries).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read an entry in frames"));

        let ok = frame_paths(
            dir,
            vec![Ok(dir.join("b.jpg")), Ok(dir.join("a.PNG")), Ok(dir.join("c.txt"))],
        )
        .unwrap();
        assert_eq!(ok, vec![dir.join("a.PNG"), dir.join("b.jpg")]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(ImageSequenceSource::open(&missing).is_err());
    }
}
