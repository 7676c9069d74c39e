use std::path::PathBuf;

use egui::{Context, RichText};

use super::PanelState;
use crate::frame::FrameActions;
use crate::params::GreyscaleMode;

pub fn draw_control_panel(
    ctx: &Context,
    state: &mut PanelState,
    flip_y: &mut bool,
    actions: &mut FrameActions,
) {
    poll_save_dialog(state, actions);

    egui::SidePanel::left("control_panel")
        .default_width(240.0)
        .show(ctx, |ui| {
            ui.heading("Normal Map");
            ui.separator();

            ui.checkbox(flip_y, "Flip Y");
            if ui
                .button("Apply")
                .on_hover_text("Regenerate every layer with the current settings")
                .clicked()
            {
                actions.apply = true;
            }

            ui.add_space(12.0);
            ui.label(RichText::new("New layer").strong());
            greyscale_combo(ui, "new_layer_greyscale", &mut state.new_layer.greyscale);
            if ui.button("Add Layer").clicked() {
                actions.add_layer = Some(state.new_layer);
            }

            ui.add_space(12.0);
            ui.label(RichText::new("Output").strong());
            ui.text_edit_singleline(&mut state.filename);
            ui.horizontal(|ui| {
                if ui.button("Save").clicked() && !state.filename.trim().is_empty() {
                    actions.save = Some(PathBuf::from(state.filename.trim()));
                }
                let browsing = state.save_dialog_rx.is_some();
                if ui.add_enabled(!browsing, egui::Button::new("Browse…")).clicked() {
                    open_save_dialog(state);
                }
            });

            ui.add_space(12.0);
            ui.separator();
            let label = format!("Theme: {}", state.theme.display_name());
            if ui.small_button(label).clicked() {
                state.theme = state.theme.toggle();
            }
        });
}

/// Greyscale mode picker shared by the control panel and layer windows.
pub fn greyscale_combo(ui: &mut egui::Ui, id: impl std::hash::Hash, mode: &mut GreyscaleMode) -> bool {
    let before = *mode;
    egui::ComboBox::from_id_salt(id)
        .selected_text(mode.display_name())
        .show_ui(ui, |ui| {
            for &m in GreyscaleMode::ALL {
                ui.selectable_value(mode, m, m.display_name());
            }
        });
    *mode != before
}

fn open_save_dialog(state: &mut PanelState) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    state.save_dialog_rx = Some(rx);
    let suggested = state.filename.clone();
    std::thread::Builder::new()
        .name("save-dialog".into())
        .spawn(move || {
            let dialog = rfd::FileDialog::new()
                .add_filter("Images", &["png", "tga", "bmp", "jpg"])
                .set_file_name(suggested);
            if let Some(path) = dialog.save_file() {
                let _ = tx.send(path);
            }
        })
        .ok();
}

/// A chosen path updates the filename and saves right away.
fn poll_save_dialog(state: &mut PanelState, actions: &mut FrameActions) {
    let Some(rx) = state.save_dialog_rx.as_ref() else {
        return;
    };
    match rx.try_recv() {
        Ok(path) => {
            state.filename = path.display().to_string();
            actions.save = Some(path);
            state.save_dialog_rx = None;
        }
        Err(crossbeam_channel::TryRecvError::Disconnected) => {
            state.save_dialog_rx = None;
        }
        Err(crossbeam_channel::TryRecvError::Empty) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsConfig;

    #[test]
    fn dialog_result_sets_filename_and_saves() {
        let mut state = PanelState::from_settings(&SettingsConfig::default());
        let (tx, rx) = crossbeam_channel::bounded(1);
        state.save_dialog_rx = Some(rx);
        let mut actions = FrameActions::default();

        poll_save_dialog(&mut state, &mut actions);
        assert!(actions.save.is_none());
        assert!(state.save_dialog_rx.is_some());

        tx.send(PathBuf::from("/tmp/bricks_n.png")).unwrap();
        poll_save_dialog(&mut state, &mut actions);
        assert_eq!(actions.save, Some(PathBuf::from("/tmp/bricks_n.png")));
        assert_eq!(state.filename, "/tmp/bricks_n.png");
        assert!(state.save_dialog_rx.is_none());
    }

    #[test]
    fn cancelled_dialog_is_forgotten() {
        let mut state = PanelState::from_settings(&SettingsConfig::default());
        let (tx, rx) = crossbeam_channel::bounded::<PathBuf>(1);
        state.save_dialog_rx = Some(rx);
        drop(tx);
        let mut actions = FrameActions::default();
        poll_save_dialog(&mut state, &mut actions);
        assert!(state.save_dialog_rx.is_none());
        assert!(actions.save.is_none());
        assert_eq!(state.filename, "normal_map.png");
    }
}
