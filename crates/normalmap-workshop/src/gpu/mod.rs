pub mod context;
pub mod error;
pub mod fullscreen_quad;
pub mod normal_map;
pub mod readback;
pub mod render_target;
pub mod resources;
pub mod shader;
pub mod uniforms;

pub use context::GpuContext;
pub use normal_map::GpuNormalMapEngine;
