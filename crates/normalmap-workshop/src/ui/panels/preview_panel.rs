use egui::{Context, TextureId, Vec2};

use super::PreviewTextures;
use crate::source::SourceImage;
use crate::ui::theme::PREVIEW_SIZE;

/// Albedo and Result windows. Result shows the composite, or the single
/// layer while there is only one.
pub fn draw_preview_windows(ctx: &Context, source: &SourceImage, previews: PreviewTextures) {
    let size = (source.width, source.height);

    egui::Window::new("Albedo")
        .default_pos(egui::pos2(700.0, 24.0))
        .resizable(false)
        .show(ctx, |ui| match previews.albedo {
            Some(id) => preview_image(ui, id, size),
            None => {
                ui.weak("not uploaded");
            }
        });

    egui::Window::new("Result")
        .default_pos(egui::pos2(700.0, 340.0))
        .resizable(false)
        .show(ctx, |ui| match previews.result {
            Some(id) => preview_image(ui, id, size),
            None => {
                ui.weak("no layers");
            }
        });
}

/// Draws `id` fitted into a square thumbnail, keeping the aspect ratio.
pub fn preview_image(ui: &mut egui::Ui, id: TextureId, (width, height): (u32, u32)) {
    ui.add(egui::Image::new(egui::load::SizedTexture::new(
        id,
        fit_preview(width, height),
    )));
}

fn fit_preview(width: u32, height: u32) -> Vec2 {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let scale = PREVIEW_SIZE / w.max(h);
    egui::vec2(w * scale, h * scale)
}
