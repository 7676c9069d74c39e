use egui::{Context, RichText};

use super::control_panel::greyscale_combo;
use super::preview_panel::preview_image;
use crate::layer::{LayerIndex, LayerStore};
use crate::params::ParameterSet;

fn window_title(index: LayerIndex) -> String {
    format!("Layer {index}")
}

/// One "Layer N" window per layer. Edits go through
/// [`LayerStore::mutate_parameters`]; regeneration happens later in the frame.
pub fn draw_layer_windows<B>(ctx: &Context, layers: &mut LayerStore<B>) {
    for i in 0..layers.len() {
        let index = LayerIndex(i);
        let Ok(layer) = layers.get(index) else {
            continue;
        };
        let before = layer.parameters;
        let mut params = before;
        let handle = layer.ui_handle;
        let size = layer.image.size();
        let dirty = layer.is_dirty();

        egui::Window::new(window_title(index))
            .id(egui::Id::new(("layer_window", i)))
            .default_pos(egui::pos2(260.0 + 24.0 * i as f32, 24.0 + 24.0 * i as f32))
            .resizable(false)
            .show(ctx, |ui| {
                draw_parameters(ui, i, &mut params);
                if dirty {
                    ui.label(RichText::new("pending").weak().small());
                }
                if let Some(id) = handle {
                    ui.add_space(4.0);
                    preview_image(ui, id, size);
                }
            });

        if params != before {
            let _ = layers.mutate_parameters(index, |p| *p = params);
        }
    }
}

fn draw_parameters(ui: &mut egui::Ui, i: usize, params: &mut ParameterSet) {
    egui::Grid::new(("layer_params", i))
        .num_columns(2)
        .spacing([8.0, 4.0])
        .show(ui, |ui| {
            ui.label("Scale");
            ui.add(
                egui::DragValue::new(&mut params.scale)
                    .range(ParameterSet::SCALE_MIN..=ParameterSet::SCALE_MAX)
                    .speed(ParameterSet::SCALE_STEP)
                    .fixed_decimals(2),
            );
            ui.end_row();

            ui.label("Blur Passes");
            ui.add(
                egui::DragValue::new(&mut params.blur_passes)
                    .range(0..=ParameterSet::BLUR_MAX)
                    .speed(1.0),
            );
            ui.end_row();

            ui.label("Greyscale");
            greyscale_combo(ui, ("layer_greyscale", i), &mut params.greyscale);
            ui.end_row();
        });
}
