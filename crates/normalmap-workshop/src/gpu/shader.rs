//! WGSL front end: parse, validate and reflect shaders before any of them
//! reaches the device, so compile and link problems surface as
//! [`ResourceError`]s with the compiler's diagnostic instead of a driver abort.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, ShaderStage, Type, TypeInner};

use super::error::ResourceError;

pub const GREYSCALE_FS: &str = include_str!("../../../../assets/shaders/normal_map/greyscale.wgsl");
pub const BLUR_FS: &str = include_str!("../../../../assets/shaders/normal_map/blur.wgsl");
pub const NORMAL_FS: &str = include_str!("../../../../assets/shaders/normal_map/normal.wgsl");
pub const ACCUMULATE_FS: &str =
    include_str!("../../../../assets/shaders/normal_map/accumulate.wgsl");
pub const RESOLVE_FS: &str = include_str!("../../../../assets/shaders/normal_map/resolve.wgsl");
pub const MIP_BLIT_FS: &str = include_str!("../../../../assets/shaders/normal_map/mip_blit.wgsl");

/// A shader that parsed, validated, and has an entry point for its stage.
#[derive(Debug, Clone)]
pub struct ValidatedShader {
    pub label: String,
    pub stage: ShaderStage,
    pub entry_point: String,
    module: Module,
}

/// Where a named uniform lives: its bind group slot and byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBinding {
    pub group: u32,
    pub binding: u32,
    pub offset: u32,
}

pub fn validate_shader(
    stage: ShaderStage,
    label: &str,
    source: &str,
) -> Result<ValidatedShader, ResourceError> {
    if source.trim().is_empty() {
        return Err(ResourceError::EmptyShaderSource {
            stage,
            label: label.to_string(),
        });
    }

    let module = naga::front::wgsl::parse_str(source).map_err(|e| ResourceError::ShaderCompile {
        stage,
        label: label.to_string(),
        diagnostic: e.emit_to_string(source),
    })?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| ResourceError::ShaderCompile {
            stage,
            label: label.to_string(),
            diagnostic: e.emit_to_string(source),
        })?;

    let entry_point = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage)
        .map(|ep| ep.name.clone())
        .ok_or_else(|| ResourceError::MissingEntryPoint {
            stage,
            label: label.to_string(),
        })?;

    Ok(ValidatedShader {
        label: label.to_string(),
        stage,
        entry_point,
        module,
    })
}

impl ValidatedShader {
    fn entry(&self) -> Option<&naga::EntryPoint> {
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.name == self.entry_point)
    }

    /// User-defined `@location`s the entry point reads.
    pub fn input_locations(&self) -> Vec<u32> {
        let mut out = Vec::new();
        if let Some(ep) = self.entry() {
            for arg in &ep.function.arguments {
                collect_locations(&self.module, arg.binding.as_ref(), arg.ty, &mut out);
            }
        }
        out.sort_unstable();
        out
    }

    /// User-defined `@location`s the entry point writes.
    pub fn output_locations(&self) -> Vec<u32> {
        let mut out = Vec::new();
        if let Some(result) = self.entry().and_then(|ep| ep.function.result.as_ref()) {
            collect_locations(&self.module, result.binding.as_ref(), result.ty, &mut out);
        }
        out.sort_unstable();
        out
    }

    /// Looks up a uniform by variable name, or by member name inside a
    /// uniform struct.
    pub fn uniform(&self, name: &str) -> Result<UniformBinding, ResourceError> {
        for (_, var) in self.module.global_variables.iter() {
            if var.space != AddressSpace::Uniform {
                continue;
            }
            let Some(rb) = var.binding.as_ref() else {
                continue;
            };
            if var.name.as_deref() == Some(name) {
                return Ok(UniformBinding {
                    group: rb.group,
                    binding: rb.binding,
                    offset: 0,
                });
            }
            if let TypeInner::Struct { members, .. } = &self.module.types[var.ty].inner {
                if let Some(m) = members.iter().find(|m| m.name.as_deref() == Some(name)) {
                    return Ok(UniformBinding {
                        group: rb.group,
                        binding: rb.binding,
                        offset: m.offset,
                    });
                }
            }
        }
        Err(ResourceError::UniformNotFound {
            label: self.label.clone(),
            name: name.to_string(),
        })
    }
}

/// Interface check between a vertex and a fragment stage: every fragment
/// input must be written by the vertex stage, and the fragment stage must
/// write colour target 0.
pub fn check_link(
    label: &str,
    vertex: &ValidatedShader,
    fragment: &ValidatedShader,
) -> Result<(), ResourceError> {
    let link_err = |diagnostic: String| ResourceError::ProgramLink {
        label: label.to_string(),
        diagnostic,
    };

    if vertex.stage != ShaderStage::Vertex {
        return Err(link_err(format!(
            "'{}' is a {:?} shader, expected Vertex",
            vertex.label, vertex.stage
        )));
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err(link_err(format!(
            "'{}' is a {:?} shader, expected Fragment",
            fragment.label, fragment.stage
        )));
    }

    let written = vertex.output_locations();
    let missing: Vec<u32> = fragment
        .input_locations()
        .into_iter()
        .filter(|loc| !written.contains(loc))
        .collect();
    if !missing.is_empty() {
        return Err(link_err(format!(
            "fragment '{}' reads @location({missing:?}) which vertex '{}' never writes",
            fragment.label, vertex.label
        )));
    }

    if !fragment.output_locations().contains(&0) {
        return Err(link_err(format!(
            "fragment '{}' does not write @location(0)",
            fragment.label
        )));
    }
    Ok(())
}

fn collect_locations(
    module: &Module,
    binding: Option<&Binding>,
    ty: Handle<Type>,
    out: &mut Vec<u32>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(*location),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for m in members {
                    collect_locations(module, m.binding.as_ref(), m.ty, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::fullscreen_quad::{FULLSCREEN_TRIANGLE_VS, FULLSCREEN_TRIANGLE_VS_WITH_UV};

    #[test]
    fn empty_source_is_rejected() {
        let err = validate_shader(ShaderStage::Fragment, "empty", "").unwrap_err();
        assert!(matches!(err, ResourceError::EmptyShaderSource { .. }));
        assert!(!err.diagnostic().is_empty());

        let err = validate_shader(ShaderStage::Vertex, "blank", "  \n\t").unwrap_err();
        assert!(matches!(err, ResourceError::EmptyShaderSource { .. }));
    }

    #[test]
    fn syntax_error_carries_diagnostic() {
        let err = validate_shader(ShaderStage::Fragment, "broken", "fn fs_main( {").unwrap_err();
        match err {
            ResourceError::ShaderCompile { diagnostic, .. } => assert!(!diagnostic.is_empty()),
            other => panic!("expected ShaderCompile, got {other:?}"),
        }
    }

    #[test]
    fn wrong_stage_is_missing_entry_point() {
        let err = validate_shader(ShaderStage::Vertex, "blur", BLUR_FS).unwrap_err();
        assert!(matches!(err, ResourceError::MissingEntryPoint { .. }));
    }

    #[test]
    fn builtin_shaders_validate() {
        for (label, src) in [
            ("greyscale", GREYSCALE_FS),
            ("blur", BLUR_FS),
            ("normal", NORMAL_FS),
            ("accumulate", ACCUMULATE_FS),
            ("resolve", RESOLVE_FS),
            ("mip-blit", MIP_BLIT_FS),
        ] {
            let fs = validate_shader(ShaderStage::Fragment, label, src).unwrap();
            assert_eq!(fs.entry_point, "fs_main");
        }
        let vs = validate_shader(ShaderStage::Vertex, "vs", FULLSCREEN_TRIANGLE_VS).unwrap();
        assert_eq!(vs.entry_point, "vs_main");
        assert!(vs.output_locations().is_empty());
    }

    #[test]
    fn effect_passes_link_with_position_only_vertex() {
        let vs = validate_shader(ShaderStage::Vertex, "vs", FULLSCREEN_TRIANGLE_VS).unwrap();
        let fs = validate_shader(ShaderStage::Fragment, "normal", NORMAL_FS).unwrap();
        check_link("normal", &vs, &fs).unwrap();
    }

    #[test]
    fn link_requires_vertex_to_write_fragment_inputs() {
        let vs = validate_shader(ShaderStage::Vertex, "vs", FULLSCREEN_TRIANGLE_VS).unwrap();
        let vs_uv =
            validate_shader(ShaderStage::Vertex, "vs-uv", FULLSCREEN_TRIANGLE_VS_WITH_UV).unwrap();
        let fs = validate_shader(ShaderStage::Fragment, "mip-blit", MIP_BLIT_FS).unwrap();

        assert_eq!(fs.input_locations(), vec![0]);
        let err = check_link("mip-blit", &vs, &fs).unwrap_err();
        assert!(matches!(err, ResourceError::ProgramLink { .. }));
        check_link("mip-blit", &vs_uv, &fs).unwrap();
    }

    #[test]
    fn link_rejects_swapped_stages() {
        let vs = validate_shader(ShaderStage::Vertex, "vs", FULLSCREEN_TRIANGLE_VS).unwrap();
        let fs = validate_shader(ShaderStage::Fragment, "blur", BLUR_FS).unwrap();
        assert!(check_link("swapped", &fs, &vs).is_err());
    }

    #[test]
    fn uniform_lookup_by_variable_and_member() {
        let fs = validate_shader(ShaderStage::Fragment, "normal", NORMAL_FS).unwrap();
        let var = fs.uniform("u").unwrap();
        assert_eq!((var.group, var.binding, var.offset), (0, 1, 0));
        let flip = fs.uniform("flip_y").unwrap();
        assert_eq!((flip.binding, flip.offset), (1, 4));
    }

    #[test]
    fn uniform_lookup_missing() {
        let fs = validate_shader(ShaderStage::Fragment, "blur", BLUR_FS).unwrap();
        let err = fs.uniform("scale").unwrap_err();
        assert!(matches!(err, ResourceError::UniformNotFound { .. }));
    }
}
