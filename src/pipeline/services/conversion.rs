use image::imageops;
use image::{ImageBuffer, Luma, Rgb, RgbImage};

use crate::common::{FramePayload, PixelFormat, Raster, Rotation};
use crate::error::ConversionError;

/// Turns a platform pixel buffer into an upright RGB raster.
pub trait RasterConverter: Send + Sync {
    fn convert(&self, payload: FramePayload, rotation: Rotation)
        -> Result<Raster, ConversionError>;
}

/// Converter built on the `image` crate's buffers and rotation operators.
#[derive(Debug, Clone, Default)]
pub struct ImageRasterConverter;

impl ImageRasterConverter {
    pub fn new() -> Self {
        Self
    }

    fn decode(payload: FramePayload) -> Result<RgbImage, ConversionError> {
        let FramePayload {
            width,
            height,
            format,
            data,
        } = payload;
        if width == 0 || height == 0 {
            return Err(ConversionError::InvalidDimensions(width, height));
        }
        let expected = format.buffer_len(width, height);
        if data.len() != expected {
            return Err(ConversionError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        let size_error = || ConversionError::BufferSize {
            expected,
            actual: expected,
        };
        match format {
            PixelFormat::Rgb8 => RgbImage::from_raw(width, height, data).ok_or_else(size_error),
            PixelFormat::Rgba8 => Ok(swizzle(width, height, &data, [0, 1, 2])),
            // -- pixel order is B G R A; convert to R G B
            PixelFormat::Bgra8 => Ok(swizzle(width, height, &data, [2, 1, 0])),
            PixelFormat::Luma8 => {
                let gray = ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(width, height, data)
                    .ok_or_else(size_error)?;
                Ok(RgbImage::from_fn(width, height, |x, y| {
                    let v = gray.get_pixel(x, y).0[0];
                    Rgb([v, v, v])
                }))
            }
            PixelFormat::Nv21 => nv21_to_rgb(width, height, &data),
        }
    }
}

impl RasterConverter for ImageRasterConverter {
    fn convert(
        &self,
        payload: FramePayload,
        rotation: Rotation,
    ) -> Result<Raster, ConversionError> {
        let image = Self::decode(payload)?;
        let upright = match rotation {
            Rotation::Deg0 => image,
            Rotation::Deg90 => imageops::rotate90(&image),
            Rotation::Deg180 => imageops::rotate180(&image),
            Rotation::Deg270 => imageops::rotate270(&image),
        };
        Ok(Raster::from(upright))
    }
}

fn swizzle(width: u32, height: u32, data: &[u8], order: [usize; 3]) -> RgbImage {
    let mut rgb = Vec::with_capacity(data.len() / 4 * 3);
    for chunk in data.chunks_exact(4) {
        rgb.extend_from_slice(&[chunk[order[0]], chunk[order[1]], chunk[order[2]]]);
    }
    RgbImage::from_vec(width, height, rgb).unwrap_or_else(|| RgbImage::new(width, height))
}

// BT.601 full-range conversion.
fn nv21_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<RgbImage, ConversionError> {
    if width % 2 != 0 || height % 2 != 0 {
        return Err(ConversionError::OddDimensions(
            PixelFormat::Nv21.name(),
            width,
            height,
        ));
    }
    let w = width as usize;
    let (luma, chroma) = data.split_at(w * height as usize);
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let c = (y / 2) * w + (x / 2) * 2;
        let yy = luma[y * w + x] as f32;
        let v = chroma[c] as f32 - 128.0;
        let u = chroma[c + 1] as f32 - 128.0;
        let r = yy + 1.402 * v;
        let g = yy - 0.344_136 * u - 0.714_136 * v;
        let b = yy + 1.772 * u;
        Rgb([clamp(r), clamp(g), clamp(b)])
    }))
}

fn clamp(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
