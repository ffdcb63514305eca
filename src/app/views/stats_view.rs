use crate::app::views::View;
use crate::pipeline::PipelineMetrics;

pub struct StatsView {
    metrics: PipelineMetrics,
}

impl StatsView {
    pub fn new(metrics: PipelineMetrics) -> Self {
        Self { metrics }
    }
}

impl View for StatsView {
    fn draw(&mut self, ui: &mut egui::Ui) {
        let stats = self.metrics.snapshot();
        ui.heading("Pipeline Statistics");
        ui.label(format!("Frames Submitted: {}", stats.frames_submitted));
        ui.label(format!("Depth Maps Published: {}", stats.frames_published));
        ui.label(format!("Depth Maps / s: {:.1}", stats.depth_maps_per_second));
        ui.label(format!(
            "Cycle Time: {:.1} ms avg, {:.1} ms max",
            stats.avg_cycle_us / 1000.0,
            stats.max_cycle_us as f32 / 1000.0
        ));
        ui.separator();
        ui.label(format!("Dropped (busy): {}", stats.dropped_busy));
        ui.label(format!("Dropped (disabled): {}", stats.dropped_disabled));
        ui.label(format!("Dropped (empty): {}", stats.dropped_empty));
        ui.label(format!("Dropped (conversion): {}", stats.dropped_conversion));
        ui.label(format!("Failed Cycles: {}", stats.cycles_failed));
    }
}
