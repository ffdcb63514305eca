use std::sync::Arc;

use tokio::sync::watch;

use crate::app::overlay::DepthOverlay;
use crate::app::views::{DepthView, StatsView, View};
use crate::common::DepthFrame;
use crate::config::UiSettings;
use crate::coordinator::Coordinator;
use crate::error::AppError;
use crate::pipeline::{OverlayPublisher, PipelineControl};

pub struct DepthOverlayApp {
    coordinator: Coordinator,
    overlay: Arc<DepthOverlay>,
    frame_rx: watch::Receiver<Option<Arc<DepthFrame>>>,
    control: PipelineControl,
    compute_depth: bool,
    depth_view: DepthView,
    stats_view: StatsView,
}

impl DepthOverlayApp {
    pub fn new(coordinator: Coordinator, overlay: Arc<DepthOverlay>) -> Self {
        let control = coordinator.control();
        let stats_view = StatsView::new(coordinator.metrics());
        Self {
            frame_rx: overlay.subscribe(),
            compute_depth: control.is_enabled(),
            control,
            coordinator,
            overlay,
            depth_view: DepthView::new(),
            stats_view,
        }
    }

    /// Runs the window on the calling thread until it is closed.
    pub fn start_gui(
        settings: &UiSettings,
        coordinator: Coordinator,
        overlay: Arc<DepthOverlay>,
    ) -> Result<(), AppError> {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size(egui::vec2(settings.width, settings.height))
                .with_title(settings.title.clone()),
            ..Default::default()
        };

        eframe::run_native(
            &settings.title,
            options,
            Box::new(move |cc| {
                overlay.attach(cc.egui_ctx.clone());
                Ok(Box::new(DepthOverlayApp::new(coordinator, overlay)))
            }),
        )
        .map_err(|e| AppError::Ui(e.to_string()))
    }
}

impl eframe::App for DepthOverlayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .checkbox(&mut self.compute_depth, "Compute depth")
                    .changed()
                {
                    tracing::info!("Depth computation toggled: {}", self.compute_depth);
                    self.control.set_enabled(self.compute_depth);
                }
                if self.control.is_busy() {
                    ui.label("processing...");
                }
            });
        });

        egui::SidePanel::right("stats")
            .resizable(true)
            .show(ctx, |ui| self.stats_view.draw(ui));

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.overlay.is_visible() {
                self.depth_view.set_frame(self.frame_rx.borrow().clone());
                self.depth_view.draw(ui);
            } else {
                ui.heading("Depth overlay hidden until the first depth map arrives");
            }
        });

        // Keep the statistics ticking while no depth maps arrive.
        ctx.request_repaint_after(std::time::Duration::from_millis(250));
    }
}

impl Drop for DepthOverlayApp {
    fn drop(&mut self) {
        tracing::info!("Closing depth overlay");
        self.coordinator.stop();
    }
}
