pub mod depth_view;
pub mod stats_view;

pub use depth_view::DepthView;
pub use stats_view::StatsView;

pub trait View {
    fn draw(&mut self, ui: &mut egui::Ui);
}
