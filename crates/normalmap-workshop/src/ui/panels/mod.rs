pub mod control_panel;
pub mod layer_panel;
pub mod preview_panel;

use std::path::PathBuf;

use crossbeam_channel::Receiver;
use egui::{Context, TextureId};

use crate::frame::{FrameActions, UiFrame};
use crate::params::ParameterSet;
use crate::settings::SettingsConfig;

use super::theme::ThemeMode;

/// UI state that outlives a single frame.
pub struct PanelState {
    /// Parameters for the next "Add Layer"; only the greyscale mode is
    /// editable from the control panel.
    pub new_layer: ParameterSet,
    pub filename: String,
    pub theme: ThemeMode,
    save_dialog_rx: Option<Receiver<PathBuf>>,
}

impl PanelState {
    pub fn from_settings(settings: &SettingsConfig) -> Self {
        Self {
            new_layer: settings.default_params,
            filename: settings.output_path.display().to_string(),
            theme: settings.theme,
            save_dialog_rx: None,
        }
    }

    /// Copies editable state back for persisting.
    pub fn store_into(&self, settings: &mut SettingsConfig) {
        settings.default_params = self.new_layer;
        settings.output_path = PathBuf::from(&self.filename);
        settings.theme = self.theme;
    }
}

/// egui handles for images that are not owned by a layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreviewTextures {
    pub albedo: Option<TextureId>,
    pub result: Option<TextureId>,
}

/// Draws every window for one frame and collects what the user asked for.
pub fn draw_panels<B>(
    ctx: &Context,
    state: &mut PanelState,
    frame: UiFrame<'_, B>,
    previews: PreviewTextures,
) -> FrameActions {
    let mut actions = FrameActions::default();

    control_panel::draw_control_panel(ctx, state, frame.flip_y, &mut actions);
    layer_panel::draw_layer_windows(ctx, frame.layers);
    preview_panel::draw_preview_windows(ctx, frame.source, previews);

    actions
}
