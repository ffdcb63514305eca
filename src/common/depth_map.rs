use image::GrayImage;
use uuid::Uuid;

use crate::common::Raster;

/// Single-channel depth samples aligned to a raster, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthMap {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl DepthMap {
    pub(crate) fn new(width: u32, height: u32, samples: Vec<u8>) -> Self {
        debug_assert_eq!(samples.len(), width as usize * height as usize);
        Self {
            width,
            height,
            samples,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.samples
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.samples
    }

    pub fn to_gray_image(&self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.samples.clone())
    }
}

/// Result of one completed processing cycle, handed to the overlay.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub frame_id: Uuid,
    pub depth: Raster,
    pub map: DepthMap,
}
