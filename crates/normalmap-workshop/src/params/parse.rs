use std::str::FromStr;

use super::{GreyscaleMode, ParameterSet};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseParamsError {
    #[error("unknown greyscale mode '{0}' (expected average, luminance, lightness or none)")]
    UnknownMode(String),
    #[error("unknown layer key '{0}' (expected scale, blur or mode)")]
    UnknownKey(String),
    #[error("expected key=value, got '{0}'")]
    MissingValue(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

impl FromStr for GreyscaleMode {
    type Err = ParseParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" => Ok(GreyscaleMode::Average),
            "luminance" => Ok(GreyscaleMode::Luminance),
            "lightness" => Ok(GreyscaleMode::Lightness),
            "none" => Ok(GreyscaleMode::None),
            other => Err(ParseParamsError::UnknownMode(other.to_string())),
        }
    }
}

/// Parses `scale=2.5,blur=3,mode=lightness`. Omitted keys keep their defaults.
impl FromStr for ParameterSet {
    type Err = ParseParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut params = ParameterSet::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ParseParamsError::MissingValue(part.to_string()))?;
            let value = value.trim();
            match key.trim() {
                "scale" => {
                    // NaN never compares equal, so such a layer would stay dirty forever.
                    params.scale = value
                        .parse::<f32>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .ok_or_else(|| ParseParamsError::InvalidValue {
                            key: "scale",
                            value: value.to_string(),
                        })?;
                }
                "blur" | "blur_passes" => {
                    params.blur_passes =
                        value.parse().map_err(|_| ParseParamsError::InvalidValue {
                            key: "blur",
                            value: value.to_string(),
                        })?;
                }
                "mode" | "greyscale" => params.greyscale = value.parse()?,
                other => return Err(ParseParamsError::UnknownKey(other.to_string())),
            }
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_keys() {
        let p: ParameterSet = "scale=2.5,blur=3,mode=lightness".parse().unwrap();
        assert_eq!(p.scale, 2.5);
        assert_eq!(p.blur_passes, 3);
        assert_eq!(p.greyscale, GreyscaleMode::Lightness);
    }

    #[test]
    fn parse_partial_keeps_defaults() {
        let p: ParameterSet = "blur=0".parse().unwrap();
        assert_eq!(p.blur_passes, 0);
        assert_eq!(p.scale, 1.0);
        assert_eq!(p.greyscale, GreyscaleMode::Luminance);
    }

    #[test]
    fn parse_empty_is_default() {
        let p: ParameterSet = "".parse().unwrap();
        assert_eq!(p, ParameterSet::default());
    }

    #[test]
    fn parse_mode_case_insensitive() {
        assert_eq!("NONE".parse::<GreyscaleMode>().unwrap(), GreyscaleMode::None);
        assert_eq!(" Average ".parse::<GreyscaleMode>().unwrap(), GreyscaleMode::Average);
    }

    #[test]
    fn parse_rejects_non_finite_scale() {
        for value in ["nan", "NaN", "inf", "-inf", "infinity"] {
            assert_eq!(
                format!("scale={value}").parse::<ParameterSet>(),
                Err(ParseParamsError::InvalidValue {
                    key: "scale",
                    value: value.to_string(),
                })
            );
        }
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            "scale".parse::<ParameterSet>(),
            Err(ParseParamsError::MissingValue("scale".into()))
        );
        assert_eq!(
            "depth=3".parse::<ParameterSet>(),
            Err(ParseParamsError::UnknownKey("depth".into()))
        );
        assert!(matches!(
            "blur=-1".parse::<ParameterSet>(),
            Err(ParseParamsError::InvalidValue { key: "blur", .. })
        ));
        assert_eq!(
            "mode=sepia".parse::<ParameterSet>(),
            Err(ParseParamsError::UnknownMode("sepia".into()))
        );
    }
}
