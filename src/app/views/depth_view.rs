use std::sync::Arc;

use egui::{ColorImage, TextureHandle, TextureOptions};
use uuid::Uuid;

use crate::app::views::View;
use crate::common::DepthFrame;

pub struct DepthView {
    current_frame: Option<Arc<DepthFrame>>,
    texture: Option<TextureHandle>,
    texture_frame: Option<Uuid>,
    show_info: bool,
}

impl DepthView {
    pub fn new() -> Self {
        Self {
            current_frame: None,
            texture: None,
            texture_frame: None,
            show_info: true,
        }
    }

    pub fn set_frame(&mut self, frame: Option<Arc<DepthFrame>>) {
        self.current_frame = frame;
    }

    fn draw_frame_info(&self, ui: &mut egui::Ui, frame: &DepthFrame) {
        ui.group(|ui| {
            ui.label(format!("Frame: {}", frame.frame_id));
            ui.label(format!(
                "Size: {}x{}",
                frame.map.width(),
                frame.map.height()
            ));
            ui.label(format!("Samples: {}", frame.map.len()));
        });
    }

    fn draw_depth_image(&mut self, ui: &mut egui::Ui, frame: &DepthFrame) {
        // Only re-upload when a new depth map arrives.
        if self.texture_frame != Some(frame.frame_id) {
            let image = ColorImage::from_gray(
                [frame.map.width() as usize, frame.map.height() as usize],
                frame.map.as_slice(),
            );
            match self.texture.as_mut() {
                Some(texture) => texture.set(image, TextureOptions::LINEAR),
                None => {
                    self.texture =
                        Some(ui.ctx().load_texture("depth_map", image, TextureOptions::LINEAR))
                }
            }
            self.texture_frame = Some(frame.frame_id);
        }

        if let Some(texture) = &self.texture {
            ui.add(egui::Image::new(texture).shrink_to_fit());
        }
    }
}

impl Default for DepthView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for DepthView {
    fn draw(&mut self, ui: &mut egui::Ui) {
        ui.checkbox(&mut self.show_info, "Show Frame Info");

        match self.current_frame.clone() {
            Some(frame) => {
                if self.show_info {
                    self.draw_frame_info(ui, &frame);
                }
                self.draw_depth_image(ui, &frame);
            }
            None => {
                ui.label("Waiting for the first depth map...");
            }
        }
    }
}
