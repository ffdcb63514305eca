use std::path::{Path, PathBuf};

use crate::common::{FramePayload, PixelFormat, RawFrame, Rotation};
use crate::error::AppError;
use crate::source::FrameProducer;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// Replays still images from a directory in file-name order, looping forever.
/// Files that fail to decode are delivered as empty frames.
pub struct ReplaySource {
    files: Vec<PathBuf>,
    rotation: Rotation,
    position: usize,
}

impl ReplaySource {
    pub fn from_dir(dir: &Path, rotation: Rotation) -> Result<Self, AppError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            AppError::Source(format!("Failed to read replay directory {}: {e}", dir.display()))
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        files.sort();
        Self::from_files(files, rotation)
    }

    pub fn from_files(files: Vec<PathBuf>, rotation: Rotation) -> Result<Self, AppError> {
        if files.is_empty() {
            return Err(AppError::Source("Replay source has no images".to_string()));
        }
        tracing::info!("Replaying {} images", files.len());
        Ok(Self {
            files,
            rotation,
            position: 0,
        })
    }

    fn load(path: &Path) -> Option<FramePayload> {
        match image::open(path) {
            Ok(image) => {
                let rgb = image.to_rgb8();
                let (width, height) = rgb.dimensions();
                Some(FramePayload::new(
                    width,
                    height,
                    PixelFormat::Rgb8,
                    rgb.into_raw(),
                ))
            }
            Err(e) => {
                tracing::warn!("Failed to decode {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl FrameProducer for ReplaySource {
    fn next_frame(&mut self) -> RawFrame {
        let path = &self.files[self.position % self.files.len()];
        self.position = (self.position + 1) % self.files.len();
        match Self::load(path) {
            Some(payload) => RawFrame::new(payload, self.rotation),
            None => RawFrame::empty(self.rotation),
        }
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
