use crate::gpu::error::DriverError;
use crate::params::{GreyscaleMode, ParameterSet};
use crate::source::SourceImage;

use super::{EffectEngine, EffectError, GpuImage, check_output};

/// RGBA8 pixels tagged with an allocation id, so buffer identity can be
/// observed the same way a GPU handle would be.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuBuffer {
    pub id: u64,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub generate: usize,
    pub regenerate: usize,
    pub composite: usize,
}

/// Reference implementation of the normal-map effect. Same math as the WGSL
/// passes, evaluated in f32 on the CPU.
#[derive(Debug, Default)]
pub struct CpuNormalMapEngine {
    next_id: u64,
    pub calls: CallCounts,
    pending: Vec<DriverError>,
}

impl CpuNormalMapEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error for the next drain, standing in for a driver fault.
    pub fn inject_error(&mut self, err: DriverError) {
        self.pending.push(err);
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl EffectEngine for CpuNormalMapEngine {
    type Buffer = CpuBuffer;

    fn generate(
        &mut self,
        source: &SourceImage,
        params: &ParameterSet,
        flip_y: bool,
    ) -> Result<GpuImage<CpuBuffer>, EffectError> {
        self.calls.generate += 1;
        let image = GpuImage {
            width: source.width,
            height: source.height,
            buffer: CpuBuffer {
                id: self.alloc_id(),
                pixels: render(source, params, flip_y),
            },
        };
        check_output(&image, source.width, source.height)?;
        Ok(image)
    }

    fn regenerate(
        &mut self,
        source: &SourceImage,
        target: &mut GpuImage<CpuBuffer>,
        params: &ParameterSet,
        flip_y: bool,
    ) -> Result<(), EffectError> {
        self.calls.regenerate += 1;
        check_output(target, source.width, source.height)?;
        target.buffer.pixels = render(source, params, flip_y);
        Ok(())
    }

    fn allocate(&mut self, width: u32, height: u32) -> Result<GpuImage<CpuBuffer>, EffectError> {
        let image = GpuImage {
            width,
            height,
            buffer: CpuBuffer {
                id: self.alloc_id(),
                pixels: vec![0; width as usize * height as usize * 4],
            },
        };
        check_output(&image, width, height)?;
        Ok(image)
    }

    fn composite(
        &mut self,
        output: &mut GpuImage<CpuBuffer>,
        layers: &[&GpuImage<CpuBuffer>],
    ) -> Result<(), EffectError> {
        self.calls.composite += 1;
        if layers.len() <= 1 {
            return Ok(());
        }
        for layer in layers {
            check_output(layer, output.width, output.height)?;
        }
        let inputs: Vec<&[u8]> = layers.iter().map(|l| l.buffer.pixels.as_slice()).collect();
        output.buffer.pixels = blend_normals(&inputs);
        Ok(())
    }

    fn read_pixels(&mut self, image: &GpuImage<CpuBuffer>) -> Result<Vec<u8>, EffectError> {
        Ok(image.buffer.pixels.clone())
    }

    fn drain_errors(&mut self) -> Vec<DriverError> {
        std::mem::take(&mut self.pending)
    }
}

/// Full effect for one layer.
pub fn render(source: &SourceImage, params: &ParameterSet, flip_y: bool) -> Vec<u8> {
    let (w, h) = (source.width, source.height);
    let mut heights = height_field(source, params.greyscale);
    for _ in 0..params.blur_passes {
        heights = blur(&heights, w, h);
    }
    normal_map(&heights, w, h, params.scale, flip_y)
}

pub fn height_field(source: &SourceImage, mode: GreyscaleMode) -> Vec<f32> {
    source
        .pixels
        .chunks_exact(4)
        .map(|px| {
            mode.height(
                f32::from(px[0]) / 255.0,
                f32::from(px[1]) / 255.0,
                f32::from(px[2]) / 255.0,
            )
        })
        .collect()
}

fn wrap(v: i64, n: u32) -> usize {
    v.rem_euclid(i64::from(n)) as usize
}

fn sample(heights: &[f32], w: u32, h: u32, x: i64, y: i64) -> f32 {
    heights[wrap(y, h) * w as usize + wrap(x, w)]
}

const BLUR_KERNEL: [[f32; 3]; 3] = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];

/// One 3x3 binomial pass with wrap-around edges.
pub fn blur(heights: &[f32], w: u32, h: u32) -> Vec<f32> {
    let mut out = Vec::with_capacity(heights.len());
    for y in 0..i64::from(h) {
        for x in 0..i64::from(w) {
            let mut sum = 0.0;
            for (ky, row) in BLUR_KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    sum += weight * sample(heights, w, h, x + kx as i64 - 1, y + ky as i64 - 1);
                }
            }
            out.push(sum / 16.0);
        }
    }
    out
}

/// Sobel gradients to encoded tangent-space normals.
pub fn normal_map(heights: &[f32], w: u32, h: u32, scale: f32, flip_y: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(heights.len() * 4);
    for y in 0..i64::from(h) {
        for x in 0..i64::from(w) {
            let s = |dx: i64, dy: i64| sample(heights, w, h, x + dx, y + dy);
            let gx = (s(1, -1) + 2.0 * s(1, 0) + s(1, 1)) - (s(-1, -1) + 2.0 * s(-1, 0) + s(-1, 1));
            let gy = (s(-1, 1) + 2.0 * s(0, 1) + s(1, 1)) - (s(-1, -1) + 2.0 * s(0, -1) + s(1, -1));
            let mut n = normalize([-gx * scale, -gy * scale, 1.0]);
            if flip_y {
                n[1] = -n[1];
            }
            out.extend_from_slice(&encode(n));
        }
    }
    out
}

/// Normalized sum of decoded normals, pixel by pixel. Inputs share a size.
pub fn blend_normals(layers: &[&[u8]]) -> Vec<u8> {
    let len = layers.first().map_or(0, |l| l.len());
    let mut out = Vec::with_capacity(len);
    for i in (0..len).step_by(4) {
        let mut sum = [0.0f32; 3];
        for layer in layers {
            let n = decode(&layer[i..i + 4]);
            sum[0] += n[0];
            sum[1] += n[1];
            sum[2] += n[2];
        }
        out.extend_from_slice(&encode(normalize(sum)));
    }
    out
}

/// Zero-length vectors resolve to straight up.
fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 1e-6 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 0.0, 1.0]
    }
}

fn encode(n: [f32; 3]) -> [u8; 4] {
    let c = |v: f32| ((v * 0.5 + 0.5).clamp(0.0, 1.0) * 255.0).round() as u8;
    [c(n[0]), c(n[1]), c(n[2]), 255]
}

fn decode(px: &[u8]) -> [f32; 3] {
    let d = |v: u8| f32::from(v) / 255.0 * 2.0 - 1.0;
    [d(px[0]), d(px[1]), d(px[2])]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::gpu::error::DriverErrorKind;

    const FLAT: [u8; 4] = [128, 128, 255, 255];

    fn px(pixels: &[u8], w: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * w + x) * 4) as usize;
        [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
    }

    /// Greyscale ramp along x (or y) from 0 to 255.
    fn ramp(w: u32, h: u32, vertical: bool) -> SourceImage {
        let mut pixels = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let t = if vertical { y * 255 / (h - 1) } else { x * 255 / (w - 1) };
                pixels.extend_from_slice(&[t as u8, t as u8, t as u8, 255]);
            }
        }
        SourceImage {
            width: w,
            height: h,
            pixels: Arc::from(pixels),
        }
    }

    #[test]
    fn uniform_source_is_flat() {
        let src = SourceImage::solid(8, 8, [128, 128, 128, 255]);
        let out = render(&src, &ParameterSet::default(), false);
        assert_eq!(out.len(), 8 * 8 * 4);
        assert!(out.chunks_exact(4).all(|p| p == FLAT));
    }

    #[test]
    fn blur_preserves_constant_and_mass() {
        let flat = vec![0.5; 16];
        assert!(blur(&flat, 4, 4).iter().all(|v| (v - 0.5).abs() < 1e-6));

        let mut spike = vec![0.0; 25];
        spike[12] = 1.0;
        let once = blur(&spike, 5, 5);
        assert!((once[12] - 0.25).abs() < 1e-6);
        assert!((once[11] - 0.125).abs() < 1e-6);
        let total: f32 = once.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blur_wraps_at_edges() {
        let mut spike = vec![0.0; 16];
        spike[0] = 1.0;
        let once = blur(&spike, 4, 4);
        // opposite corner is a diagonal neighbour under wrap-around
        assert!((once[15] - 1.0 / 16.0).abs() < 1e-6);
    }

    #[test]
    fn horizontal_ramp_tilts_x_only() {
        let src = ramp(16, 16, false);
        let params = ParameterSet {
            blur_passes: 0,
            ..ParameterSet::default()
        };
        let out = render(&src, &params, false);
        let p = px(&out, 16, 8, 8);
        assert!(p[0] < 128, "rising height should tilt the normal toward -x: {p:?}");
        assert_eq!(p[1], 128);
    }

    #[test]
    fn scale_increases_tilt() {
        let src = ramp(16, 16, false);
        let weak = ParameterSet {
            blur_passes: 0,
            scale: 1.0,
            ..ParameterSet::default()
        };
        let strong = ParameterSet { scale: 5.0, ..weak };
        let a = px(&render(&src, &weak, false), 16, 8, 8);
        let b = px(&render(&src, &strong, false), 16, 8, 8);
        assert!(b[0] < a[0]);
        assert!(b[2] < a[2]);
    }

    #[test]
    fn flip_y_mirrors_green() {
        let src = ramp(16, 16, true);
        let params = ParameterSet {
            blur_passes: 0,
            ..ParameterSet::default()
        };
        let plain = px(&render(&src, &params, false), 16, 8, 8);
        let flipped = px(&render(&src, &params, true), 16, 8, 8);
        assert_ne!(plain[1], 128);
        assert!((i32::from(plain[1]) + i32::from(flipped[1]) - 255).abs() <= 1);
        assert_eq!(plain[0], flipped[0]);
        assert_eq!(plain[2], flipped[2]);
    }

    #[test]
    fn greyscale_mode_changes_output() {
        let pixels: Vec<u8> = (0..8 * 8)
            .flat_map(|i| {
                if i % 3 == 0 { [255, 0, 0, 255] } else { [0, 0, 255, 255] }
            })
            .collect();
        let src = SourceImage::from_rgba(8, 8, pixels).unwrap();
        let base = ParameterSet {
            blur_passes: 0,
            ..ParameterSet::default()
        };
        let lum = render(&src, &base, false);
        let red = render(
            &src,
            &ParameterSet {
                greyscale: GreyscaleMode::None,
                ..base
            },
            false,
        );
        assert_ne!(lum, red);
    }

    #[test]
    fn regenerate_is_idempotent_and_keeps_buffer() {
        let mut engine = CpuNormalMapEngine::new();
        let src = ramp(16, 16, false);
        let params = ParameterSet::default();
        let mut img = engine.generate(&src, &params, false).unwrap();
        let id = img.buffer.id;

        engine.regenerate(&src, &mut img, &params, false).unwrap();
        let first = img.buffer.pixels.clone();
        engine.regenerate(&src, &mut img, &params, false).unwrap();
        assert_eq!(img.buffer.pixels, first);
        assert_eq!(img.buffer.id, id);
        assert_eq!(engine.calls.generate, 1);
        assert_eq!(engine.calls.regenerate, 2);
    }

    #[test]
    fn regenerate_rejects_wrong_size_target() {
        let mut engine = CpuNormalMapEngine::new();
        let mut img = engine.allocate(4, 4).unwrap();
        let src = SourceImage::solid(8, 8, [0, 0, 0, 255]);
        let err = engine
            .regenerate(&src, &mut img, &ParameterSet::default(), false)
            .unwrap_err();
        assert!(matches!(err, EffectError::DimensionMismatch { .. }));
    }

    #[test]
    fn generated_buffers_are_distinct() {
        let mut engine = CpuNormalMapEngine::new();
        let src = SourceImage::solid(4, 4, [0, 0, 0, 255]);
        let a = engine.generate(&src, &ParameterSet::default(), false).unwrap();
        let b = engine.generate(&src, &ParameterSet::default(), false).unwrap();
        assert_ne!(a.buffer.id, b.buffer.id);
    }

    #[test]
    fn composite_single_layer_leaves_output_untouched() {
        let mut engine = CpuNormalMapEngine::new();
        let src = ramp(8, 8, false);
        let layer = engine.generate(&src, &ParameterSet::default(), false).unwrap();
        let mut out = engine.allocate(8, 8).unwrap();
        out.buffer.pixels.fill(7);

        engine.composite(&mut out, &[&layer]).unwrap();
        assert!(out.buffer.pixels.iter().all(|&b| b == 7));
        engine.composite(&mut out, &[]).unwrap();
        assert!(out.buffer.pixels.iter().all(|&b| b == 7));
        assert_eq!(engine.calls.composite, 2);
    }

    #[test]
    fn composite_combines_both_tilts() {
        let mut engine = CpuNormalMapEngine::new();
        let params = ParameterSet {
            blur_passes: 0,
            ..ParameterSet::default()
        };
        let a = engine.generate(&ramp(16, 16, false), &params, false).unwrap();
        let b = engine.generate(&ramp(16, 16, true), &params, false).unwrap();
        let mut out = engine.allocate(16, 16).unwrap();
        engine.composite(&mut out, &[&a, &b]).unwrap();

        let pa = px(&a.buffer.pixels, 16, 8, 8);
        let pb = px(&b.buffer.pixels, 16, 8, 8);
        let po = px(&out.buffer.pixels, 16, 8, 8);
        // each axis keeps the sign of the layer that tilts it
        assert!(po[0] < 128 && pa[0] < 128);
        assert!(po[1] < 128 && pb[1] < 128);
        assert_eq!(po[3], 255);
    }

    #[test]
    fn composite_identical_layers_is_stable() {
        let mut engine = CpuNormalMapEngine::new();
        let src = ramp(8, 8, false);
        let a = engine.generate(&src, &ParameterSet::default(), false).unwrap();
        let b = engine.generate(&src, &ParameterSet::default(), false).unwrap();
        let mut out = engine.allocate(8, 8).unwrap();
        engine.composite(&mut out, &[&a, &b]).unwrap();
        for (x, y) in a.buffer.pixels.iter().zip(&out.buffer.pixels) {
            assert!((i32::from(*x) - i32::from(*y)).abs() <= 1);
        }
    }

    #[test]
    fn blend_of_zero_sum_points_up() {
        let down = [0u8, 0, 0, 255];
        let up = [255u8, 255, 255, 255];
        let out = blend_normals(&[&down, &up]);
        assert_eq!(out, FLAT.to_vec());
    }

    #[test]
    fn injected_errors_drain_in_order() {
        let mut engine = CpuNormalMapEngine::new();
        for label in ["a", "b"] {
            engine.inject_error(DriverError {
                kind: DriverErrorKind::Validation,
                label: label.into(),
                message: "boom".into(),
            });
        }
        let drained = engine.drain_errors();
        assert_eq!(drained.iter().map(|e| e.label.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert!(engine.drain_errors().is_empty());
        assert!(engine.assert_no_errors().is_ok());
    }
}
