use std::path::PathBuf;

use clap::Parser;

use crate::params::ParameterSet;

#[derive(Parser, Debug)]
#[command(
    name = "normalmap-workshop",
    version,
    about = "Layered normal-map generator with live preview"
)]
pub struct Cli {
    /// Source (albedo) image.
    #[arg(value_name = "IMAGE", default_value = "textures/test_image.png")]
    pub source: PathBuf,

    /// Where Save writes the result; overrides the saved setting.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Flip the green channel of every layer.
    #[arg(long)]
    pub flip_y: bool,

    /// Layer parameters, e.g. `scale=2.5,blur=3,mode=lightness`. Repeatable.
    #[arg(long = "layer", value_name = "SPEC")]
    pub layers: Vec<ParameterSet>,

    /// Generate, composite and save without opening a window.
    #[arg(long)]
    pub headless: bool,
}

impl Cli {
    /// Layers to create at startup; one default layer when none were given.
    pub fn initial_layers(&self) -> Vec<ParameterSet> {
        if self.layers.is_empty() {
            vec![ParameterSet::default()]
        } else {
            self.layers.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::GreyscaleMode;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["normalmap-workshop"]).unwrap();
        assert_eq!(cli.source, PathBuf::from("textures/test_image.png"));
        assert!(cli.output.is_none());
        assert!(!cli.flip_y);
        assert!(!cli.headless);
        assert_eq!(cli.initial_layers(), vec![ParameterSet::default()]);
    }

    #[test]
    fn repeated_layers_keep_order() {
        let cli = Cli::try_parse_from([
            "normalmap-workshop",
            "brick.png",
            "--layer",
            "scale=2.5,blur=3",
            "--layer",
            "mode=lightness",
            "--headless",
            "-o",
            "brick_n.png",
        ])
        .unwrap();
        let layers = cli.initial_layers();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].scale, 2.5);
        assert_eq!(layers[0].blur_passes, 3);
        assert_eq!(layers[1].greyscale, GreyscaleMode::Lightness);
        assert_eq!(cli.output, Some(PathBuf::from("brick_n.png")));
        assert!(cli.headless);
    }

    #[test]
    fn bad_layer_spec_is_rejected() {
        assert!(Cli::try_parse_from(["normalmap-workshop", "--layer", "mode=sepia"]).is_err());
    }
}
