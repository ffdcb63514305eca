use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;

use crate::common::DepthFrame;
use crate::pipeline::OverlayPublisher;

/// Publisher backed by the egui window. Frames are parked in a watch channel
/// and picked up by the UI thread on its next repaint.
pub struct DepthOverlay {
    visible: AtomicBool,
    frame_tx: watch::Sender<Option<Arc<DepthFrame>>>,
    repaint: OnceLock<egui::Context>,
}

impl DepthOverlay {
    pub fn new() -> Self {
        let (frame_tx, _) = watch::channel(None);
        Self {
            visible: AtomicBool::new(false),
            frame_tx,
            repaint: OnceLock::new(),
        }
    }

    /// Connects the overlay to the UI so publishes can request a repaint.
    pub fn attach(&self, ctx: egui::Context) {
        if self.repaint.set(ctx).is_err() {
            tracing::warn!("Depth overlay already attached to a UI context");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<DepthFrame>>> {
        self.frame_tx.subscribe()
    }
}

impl Default for DepthOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayPublisher for DepthOverlay {
    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    fn set_visible(&self) {
        if !self.visible.swap(true, Ordering::AcqRel) {
            tracing::debug!("Depth overlay shown");
        }
    }

    fn publish(&self, frame: Arc<DepthFrame>) {
        self.frame_tx.send_replace(Some(frame));
        if let Some(ctx) = self.repaint.get() {
            ctx.request_repaint();
        }
    }
}
