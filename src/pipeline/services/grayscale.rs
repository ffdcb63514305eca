use crate::common::{DepthMap, Raster};

// 0.299, 0.587 and 0.114 in Q16. The weights sum to 65535 so that full white
// lands just under 255 and truncates to 254. Any gray (k, k, k) with k >= 1
// therefore reduces to k - 1.
const RED_WEIGHT: u32 = 19_595;
const GREEN_WEIGHT: u32 = 38_469;
const BLUE_WEIGHT: u32 = 7_471;
const FRACTION_BITS: u32 = 16;

/// Reduces an RGB raster to one luminance byte per pixel.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscaleReducer;

impl GrayscaleReducer {
    pub fn new() -> Self {
        Self
    }

    /// Luminance of one pixel, truncated toward zero.
    pub fn luma([r, g, b]: [u8; 3]) -> u8 {
        let luma = RED_WEIGHT * r as u32 + GREEN_WEIGHT * g as u32 + BLUE_WEIGHT * b as u32;
        (luma >> FRACTION_BITS) as u8
    }

    pub fn reduce(&self, raster: &Raster) -> DepthMap {
        let samples = raster.pixels().map(Self::luma).collect();
        DepthMap::new(raster.width(), raster.height(), samples)
    }
}
