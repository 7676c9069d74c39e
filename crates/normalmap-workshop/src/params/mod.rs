mod parse;

use serde::{Deserialize, Serialize};

/// How a source colour is reduced to a single height value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GreyscaleMode {
    Average,
    #[default]
    Luminance,
    Lightness,
    /// Use the red channel as-is.
    None,
}

impl GreyscaleMode {
    pub const ALL: &[GreyscaleMode] = &[
        GreyscaleMode::Average,
        GreyscaleMode::Luminance,
        GreyscaleMode::Lightness,
        GreyscaleMode::None,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            GreyscaleMode::Average => "Average",
            GreyscaleMode::Luminance => "Luminance",
            GreyscaleMode::Lightness => "Lightness",
            GreyscaleMode::None => "None",
        }
    }

    /// Value of the `mode` field in the greyscale shader's uniforms.
    pub fn as_u32(&self) -> u32 {
        match self {
            GreyscaleMode::Average => 0,
            GreyscaleMode::Luminance => 1,
            GreyscaleMode::Lightness => 2,
            GreyscaleMode::None => 3,
        }
    }

    /// Height in `[0, 1]` for an sRGB-encoded colour in `[0, 1]`.
    pub fn height(&self, r: f32, g: f32, b: f32) -> f32 {
        match self {
            GreyscaleMode::Average => (r + g + b) / 3.0,
            GreyscaleMode::Luminance => 0.299 * r + 0.587 * g + 0.114 * b,
            GreyscaleMode::Lightness => (r.max(g).max(b) + r.min(g).min(b)) * 0.5,
            GreyscaleMode::None => r,
        }
    }
}

/// Inputs of the normal-map effect for one layer.
///
/// Equality is the only change signal the frame loop uses, so every field
/// that affects the generated pixels lives here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    pub blur_passes: u32,
    pub scale: f32,
    pub greyscale: GreyscaleMode,
}

impl ParameterSet {
    pub const SCALE_MIN: f32 = 1.0;
    pub const SCALE_MAX: f32 = 100.0;
    pub const SCALE_STEP: f32 = 0.25;
    pub const BLUR_MAX: u32 = 100;
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            blur_passes: 2,
            scale: 1.0,
            greyscale: GreyscaleMode::Luminance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn default_parameters() {
        let p = ParameterSet::default();
        assert_eq!(p.blur_passes, 2);
        assert_eq!(p.scale, 1.0);
        assert_eq!(p.greyscale, GreyscaleMode::Luminance);
    }

    #[test]
    fn equality_tracks_every_field() {
        let a = ParameterSet::default();
        assert_eq!(a, ParameterSet::default());
        assert_ne!(a, ParameterSet { blur_passes: 3, ..a });
        assert_ne!(a, ParameterSet { scale: 5.0, ..a });
        assert_ne!(
            a,
            ParameterSet {
                greyscale: GreyscaleMode::Average,
                ..a
            }
        );
    }

    #[test]
    fn greyscale_shader_codes_are_distinct() {
        let codes: std::collections::BTreeSet<u32> =
            GreyscaleMode::ALL.iter().map(|m| m.as_u32()).collect();
        assert_eq!(codes.len(), GreyscaleMode::ALL.len());
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn greyscale_heights() {
        assert!(approx_eq(GreyscaleMode::Average.height(0.3, 0.6, 0.9), 0.6, 1e-6));
        assert!(approx_eq(GreyscaleMode::Luminance.height(1.0, 1.0, 1.0), 1.0, 1e-6));
        assert!(approx_eq(GreyscaleMode::Lightness.height(0.2, 0.8, 0.5), 0.5, 1e-6));
        assert!(approx_eq(GreyscaleMode::None.height(0.25, 0.9, 0.9), 0.25, 1e-6));
    }

    #[test]
    fn serde_roundtrip() {
        let p = ParameterSet {
            blur_passes: 7,
            scale: 2.5,
            greyscale: GreyscaleMode::Lightness,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"lightness\""));
        let back: ParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn serde_missing_fields_use_defaults() {
        let p: ParameterSet = serde_json::from_str(r#"{"scale": 4.0}"#).unwrap();
        assert_eq!(p.scale, 4.0);
        assert_eq!(p.blur_passes, 2);
        assert_eq!(p.greyscale, GreyscaleMode::Luminance);
    }
}
