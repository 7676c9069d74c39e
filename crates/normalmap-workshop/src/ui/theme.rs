use egui::{Color32, CornerRadius, Stroke, Visuals};
use serde::{Deserialize, Serialize};

pub const PANEL_ROUNDING: u8 = 6;
pub const WIDGET_ROUNDING: u8 = 4;
pub const SPACING: f32 = 8.0;
/// Edge length of the layer and preview thumbnails, in points.
pub const PREVIEW_SIZE: f32 = 256.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

struct Palette {
    panel: Color32,
    canvas: Color32,
    text: Color32,
    text_dim: Color32,
    accent: Color32,
    widget: Color32,
    widget_hover: Color32,
    widget_active: Color32,
    separator: Color32,
}

const DARK: Palette = Palette {
    panel: Color32::from_rgb(0x1E, 0x1F, 0x24),
    canvas: Color32::from_rgb(0x12, 0x13, 0x16),
    text: Color32::from_rgb(0xE8, 0xE8, 0xEC),
    text_dim: Color32::from_rgb(0xA0, 0xA2, 0xAA),
    accent: Color32::from_rgb(0x80, 0x80, 0xFF),
    widget: Color32::from_rgb(0x2A, 0x2B, 0x32),
    widget_hover: Color32::from_rgb(0x35, 0x36, 0x40),
    widget_active: Color32::from_rgb(0x40, 0x42, 0x4E),
    separator: Color32::from_rgb(0x3A, 0x3B, 0x44),
};

const LIGHT: Palette = Palette {
    panel: Color32::from_rgb(0xFF, 0xFF, 0xFF),
    canvas: Color32::from_rgb(0xF3, 0xF3, 0xF7),
    text: Color32::from_rgb(0x1A, 0x1A, 0x20),
    text_dim: Color32::from_rgb(0x5A, 0x5A, 0x66),
    accent: Color32::from_rgb(0x30, 0x30, 0xC0),
    widget: Color32::from_rgb(0xE8, 0xE8, 0xEE),
    widget_hover: Color32::from_rgb(0xDD, 0xDD, 0xE6),
    widget_active: Color32::from_rgb(0xD0, 0xD0, 0xDC),
    separator: Color32::from_rgb(0xD5, 0xD5, 0xDE),
};

impl ThemeMode {
    pub const ALL: &[ThemeMode] = &[ThemeMode::Dark, ThemeMode::Light];

    pub fn display_name(&self) -> &'static str {
        match self {
            ThemeMode::Dark => "Dark",
            ThemeMode::Light => "Light",
        }
    }

    pub fn toggle(&self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }

    pub fn visuals(&self) -> Visuals {
        let (mut v, p) = match self {
            ThemeMode::Dark => (Visuals::dark(), &DARK),
            ThemeMode::Light => (Visuals::light(), &LIGHT),
        };

        v.panel_fill = p.panel;
        v.window_fill = p.panel;
        v.extreme_bg_color = p.canvas;
        v.override_text_color = Some(p.text);
        v.selection.bg_fill = p.accent.gamma_multiply(0.4);
        v.selection.stroke = Stroke::new(1.0, p.accent);

        let rounding = CornerRadius::same(WIDGET_ROUNDING);
        let w = &mut v.widgets;
        w.noninteractive.bg_fill = p.panel;
        w.noninteractive.fg_stroke = Stroke::new(1.0, p.text_dim);
        w.noninteractive.bg_stroke = Stroke::new(0.5, p.separator);
        w.noninteractive.corner_radius = rounding;
        w.inactive.bg_fill = p.widget;
        w.inactive.fg_stroke = Stroke::new(1.0, p.text);
        w.inactive.bg_stroke = Stroke::new(0.5, p.separator);
        w.inactive.corner_radius = rounding;
        for state in [&mut w.hovered, &mut w.active, &mut w.open] {
            state.fg_stroke = Stroke::new(1.0, p.text);
            state.bg_stroke = Stroke::new(1.0, p.accent);
            state.corner_radius = rounding;
        }
        w.hovered.bg_fill = p.widget_hover;
        w.active.bg_fill = p.widget_active;
        w.open.bg_fill = p.widget_active;

        v.window_corner_radius = CornerRadius::same(PANEL_ROUNDING);
        v.window_stroke = Stroke::new(1.0, p.separator);
        v
    }
}
