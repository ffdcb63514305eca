use rand::Rng;

use crate::common::{FramePayload, PixelFormat, RawFrame, Rotation};
use crate::source::FrameProducer;

/// Test pattern: a sky-to-ground gradient with a bright disc sweeping across
/// it and a little sensor noise.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    rotation: Rotation,
    tick: u64,
    noise: u8,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            rotation,
            tick: 0,
            noise: 6,
        }
    }

    pub fn with_noise(mut self, noise: u8) -> Self {
        self.noise = noise;
        self
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.width as f32, self.height as f32);
        let radius = h.min(w) * 0.15;
        let cx = (self.tick as f32 * 4.0) % (w + 2.0 * radius) - radius;
        let cy = h * 0.6;

        let mut rng = rand::rng();
        let mut data = Vec::with_capacity(PixelFormat::Rgb8.buffer_len(self.width, self.height));
        for y in 0..self.height {
            let t = y as f32 / h;
            for x in 0..self.width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let mut rgb = if dx * dx + dy * dy <= radius * radius {
                    [240.0, 220.0, 90.0]
                } else {
                    [90.0 + 60.0 * t, 140.0 - 40.0 * t, 220.0 - 170.0 * t]
                };
                if self.noise > 0 {
                    let n = self.noise as f32;
                    for channel in rgb.iter_mut() {
                        *channel += rng.random_range(-n..=n);
                    }
                }
                data.extend(rgb.map(|c| c.clamp(0.0, 255.0) as u8));
            }
        }
        data
    }
}

impl FrameProducer for SyntheticSource {
    fn next_frame(&mut self) -> RawFrame {
        let data = self.render();
        self.tick = self.tick.wrapping_add(1);
        RawFrame::new(
            FramePayload::new(self.width, self.height, PixelFormat::Rgb8, data),
            self.rotation,
        )
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}
