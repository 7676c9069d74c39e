use bytemuck::{Pod, Zeroable};

use crate::params::ParameterSet;

/// Must match `GreyscaleUniforms` in greyscale.wgsl.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct GreyscaleUniforms {
    pub mode: u32,
    pub _pad: [u32; 3],
}

/// Must match `NormalUniforms` in normal.wgsl.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct NormalUniforms {
    pub scale: f32,
    pub flip_y: u32,
    pub _pad: [u32; 2],
}

impl GreyscaleUniforms {
    pub fn from_params(params: &ParameterSet) -> Self {
        Self {
            mode: params.greyscale.as_u32(),
            _pad: [0; 3],
        }
    }
}

impl NormalUniforms {
    pub fn from_params(params: &ParameterSet, flip_y: bool) -> Self {
        Self {
            scale: params.scale,
            flip_y: u32::from(flip_y),
            _pad: [0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use naga::ShaderStage;

    use super::*;
    use crate::gpu::shader::{validate_shader, GREYSCALE_FS, NORMAL_FS};
    use crate::params::GreyscaleMode;

    #[test]
    fn uniform_sizes_are_16() {
        assert_eq!(std::mem::size_of::<GreyscaleUniforms>(), 16);
        assert_eq!(std::mem::size_of::<NormalUniforms>(), 16);
    }

    #[test]
    fn layout_matches_wgsl() {
        let fs = validate_shader(ShaderStage::Fragment, "normal", NORMAL_FS).unwrap();
        assert_eq!(fs.uniform("scale").unwrap().offset, 0);
        assert_eq!(fs.uniform("flip_y").unwrap().offset, 4);

        let fs = validate_shader(ShaderStage::Fragment, "greyscale", GREYSCALE_FS).unwrap();
        assert_eq!(fs.uniform("mode").unwrap().offset, 0);
    }

    #[test]
    fn from_params_packs_fields() {
        let params = ParameterSet {
            blur_passes: 4,
            scale: 3.5,
            greyscale: GreyscaleMode::Lightness,
        };
        let g = GreyscaleUniforms::from_params(&params);
        assert_eq!(g.mode, 2);
        let n = NormalUniforms::from_params(&params, true);
        assert_eq!(n.scale, 3.5);
        assert_eq!(n.flip_y, 1);
        assert_eq!(NormalUniforms::from_params(&params, false).flip_y, 0);
    }
}
