use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::error::ConversionError;

/// Packed RGB8 pixel grid, row-major with a top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    image: RgbImage,
}

impl Raster {
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ConversionError> {
        if width == 0 || height == 0 {
            return Err(ConversionError::InvalidDimensions(width, height));
        }
        let expected = width as usize * height as usize * 3;
        let actual = data.len();
        RgbImage::from_raw(width, height, data)
            .map(Self::from)
            .ok_or(ConversionError::BufferSize { expected, actual })
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.image.get_pixel(x, y).0
    }

    /// Pixels in scan order.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.image.pixels().map(|p| p.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Resamples to exactly `width` x `height`. Same-size requests are a plain copy.
    pub fn resized(&self, width: u32, height: u32) -> Raster {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Self::from(imageops::resize(&self.image, width, height, FilterType::Triangle))
    }
}

impl From<RgbImage> for Raster {
    fn from(image: RgbImage) -> Self {
        Self { image }
    }
}
