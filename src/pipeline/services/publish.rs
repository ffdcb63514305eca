use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::common::DepthFrame;

/// Rendering surface that shows the latest depth map.
///
/// `publish` replaces whatever is displayed and schedules a redraw. Surfaces
/// tied to a UI thread are responsible for handing the frame over to it.
pub trait OverlayPublisher: Send + Sync {
    fn is_visible(&self) -> bool;
    fn set_visible(&self);
    fn publish(&self, frame: Arc<DepthFrame>);
}

/// Headless surface that only reports what it would draw.
#[derive(Debug, Default)]
pub struct TracingPublisher {
    visible: AtomicBool,
}

impl TracingPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OverlayPublisher for TracingPublisher {
    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    fn set_visible(&self) {
        self.visible.store(true, Ordering::Release);
    }

    fn publish(&self, frame: Arc<DepthFrame>) {
        let samples = frame.map.as_slice();
        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|&v| v as f64).sum::<f64>() / samples.len() as f64
        };
        info!(
            frame_id = %frame.frame_id,
            width = frame.map.width(),
            height = frame.map.height(),
            mean_depth = format_args!("{mean:.1}"),
            "Depth map published"
        );
    }
}
