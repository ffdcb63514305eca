use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ConversionError;

/// Clockwise rotation needed to bring a sensor frame upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether applying this rotation swaps width and height.
    pub fn is_transposing(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl TryFrom<u32> for Rotation {
    type Error = ConversionError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(ConversionError::UnsupportedRotation(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Bgra8,
    Luma8,
    /// Full-resolution Y plane followed by an interleaved V/U plane at quarter resolution.
    Nv21,
}

impl PixelFormat {
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Rgba8 => "RGBA8",
            PixelFormat::Bgra8 => "BGRA8",
            PixelFormat::Luma8 => "Luma8",
            PixelFormat::Nv21 => "NV21",
        }
    }

    /// Number of bytes a `width` x `height` frame occupies in this format.
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgb8 => pixels * 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => pixels * 4,
            PixelFormat::Luma8 => pixels,
            PixelFormat::Nv21 => pixels + pixels / 2,
        }
    }
}

/// Platform pixel buffer as delivered by a camera callback.
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl FramePayload {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }
}

/// One camera callback. A frame without a payload carries nothing decodable
/// and is discarded on arrival.
#[derive(Debug, Clone)]
pub struct RawFrame {
    id: Uuid,
    payload: Option<FramePayload>,
    rotation: Rotation,
    captured_at: DateTime<Utc>,
}

impl RawFrame {
    pub fn new(payload: FramePayload, rotation: Rotation) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: Some(payload),
            rotation,
            captured_at: Utc::now(),
        }
    }

    pub fn empty(rotation: Rotation) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: None,
            rotation,
            captured_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn into_payload(self) -> Option<FramePayload> {
        self.payload
    }
}
