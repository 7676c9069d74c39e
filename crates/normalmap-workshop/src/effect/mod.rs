//! The pixel effect behind every layer: greyscale, blur, Sobel normals, and
//! the normal blend used for compositing.
//!
//! [`EffectEngine`] is the seam between the frame loop and whatever runs the
//! math. [`crate::gpu::GpuNormalMapEngine`] renders with wgpu;
//! [`CpuNormalMapEngine`] is a deterministic reference used headless and in
//! tests.

pub mod cpu;

use crate::gpu::error::{DriverError, DriverErrors, ResourceError};
use crate::params::ParameterSet;
use crate::source::SourceImage;

pub use cpu::CpuNormalMapEngine;

/// An effect output owned by exactly one layer (or by the compositor).
#[derive(Debug)]
pub struct GpuImage<B> {
    pub width: u32,
    pub height: u32,
    pub buffer: B,
}

impl<B> GpuImage<B> {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Driver(#[from] DriverErrors),
    #[error("effect output is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("effect output has zero size")]
    EmptyOutput,
}

/// Capability set the frame loop drives. All calls happen on the frame thread.
pub trait EffectEngine {
    type Buffer;

    /// Runs the effect into a freshly allocated buffer.
    fn generate(
        &mut self,
        source: &SourceImage,
        params: &ParameterSet,
        flip_y: bool,
    ) -> Result<GpuImage<Self::Buffer>, EffectError>;

    /// Re-runs the effect into `target`. The buffer identity must not change,
    /// so anything bound to it (UI textures) stays valid.
    fn regenerate(
        &mut self,
        source: &SourceImage,
        target: &mut GpuImage<Self::Buffer>,
        params: &ParameterSet,
        flip_y: bool,
    ) -> Result<(), EffectError>;

    /// Blank output buffer for compositing.
    fn allocate(&mut self, width: u32, height: u32) -> Result<GpuImage<Self::Buffer>, EffectError>;

    /// Blends `layers` in order into `output`. Leaves `output` untouched when
    /// there is at most one layer.
    fn composite(
        &mut self,
        output: &mut GpuImage<Self::Buffer>,
        layers: &[&GpuImage<Self::Buffer>],
    ) -> Result<(), EffectError>;

    /// Tightly packed RGBA8 rows.
    fn read_pixels(&mut self, image: &GpuImage<Self::Buffer>) -> Result<Vec<u8>, EffectError>;

    /// Driver errors queued since the last drain, oldest first.
    fn drain_errors(&mut self) -> Vec<DriverError>;

    fn assert_no_errors(&mut self) -> Result<(), DriverErrors> {
        DriverErrors::check(self.drain_errors())
    }
}

/// Output handles must be non-empty and match the requested size.
pub fn check_output<B>(image: &GpuImage<B>, width: u32, height: u32) -> Result<(), EffectError> {
    if image.width == 0 || image.height == 0 {
        return Err(EffectError::EmptyOutput);
    }
    if image.size() != (width, height) {
        return Err(EffectError::DimensionMismatch {
            expected: (width, height),
            actual: image.size(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_output_accepts_matching_size() {
        let img = GpuImage {
            width: 4,
            height: 2,
            buffer: (),
        };
        assert!(check_output(&img, 4, 2).is_ok());
    }

    #[test]
    fn check_output_rejects_empty_and_mismatch() {
        let empty = GpuImage {
            width: 0,
            height: 2,
            buffer: (),
        };
        assert!(matches!(check_output(&empty, 0, 2), Err(EffectError::EmptyOutput)));

        let img = GpuImage {
            width: 4,
            height: 2,
            buffer: (),
        };
        assert!(matches!(
            check_output(&img, 2, 4),
            Err(EffectError::DimensionMismatch { .. })
        ));
    }
}
