use std::rc::Rc;
use std::sync::Arc;

use naga::ShaderStage;
use wgpu::{BindGroup, BindGroupEntry, BindingResource, CommandEncoder, Device, TextureFormat, TextureView};

use super::error::DriverError;
use super::fullscreen_quad::FULLSCREEN_TRIANGLE_VS;
use super::readback;
use super::render_target::{PingPongTarget, RenderTarget};
use super::resources::{
    GpuTexture, Program, ResourceProvider, run_fullscreen_pass, tex_entry, uniform_entry,
};
use super::shader::{ACCUMULATE_FS, BLUR_FS, GREYSCALE_FS, NORMAL_FS, RESOLVE_FS};
use super::uniforms::{GreyscaleUniforms, NormalUniforms};
use crate::effect::{EffectEngine, EffectError, GpuImage, check_output};
use crate::params::ParameterSet;
use crate::source::SourceImage;

/// Height fields and normal sums need more than 8 bits.
const SCRATCH_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
/// Layer and composite outputs: sampled by the UI and read back for saving.
pub const OUTPUT_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

struct UploadedSource {
    pixels: Arc<[u8]>,
    texture: GpuTexture,
}

/// Normal-map effect rendered with fullscreen passes:
/// greyscale -> blur (ping-pong, N passes) -> Sobel normals into the layer
/// target. Compositing sums decoded normals in a float accumulator and
/// resolves into the output.
pub struct GpuNormalMapEngine {
    resources: Rc<ResourceProvider>,
    greyscale: Program,
    blur: Program,
    normal: Program,
    accumulate: Program,
    resolve: Program,
    greyscale_uniforms: wgpu::Buffer,
    normal_uniforms: wgpu::Buffer,
    source: Option<UploadedSource>,
    scratch: Option<PingPongTarget>,
    accumulator: Option<PingPongTarget>,
    allocated: usize,
}

impl GpuNormalMapEngine {
    pub fn new(resources: Rc<ResourceProvider>) -> Result<Self, EffectError> {
        let vs = resources.compile_shader(ShaderStage::Vertex, "fullscreen-vs", FULLSCREEN_TRIANGLE_VS)?;
        let link = |label: &str, fs_src: &str, entries: &[wgpu::BindGroupLayoutEntry], format| {
            let fs = resources.compile_shader(ShaderStage::Fragment, label, fs_src)?;
            resources.link_program(label, &vs, &fs, entries, format)
        };

        let uniform_size = std::mem::size_of::<NormalUniforms>();
        let greyscale = link(
            "greyscale",
            GREYSCALE_FS,
            &[tex_entry(0), uniform_entry(1, std::mem::size_of::<GreyscaleUniforms>())],
            SCRATCH_FORMAT,
        )?;
        let blur = link("blur", BLUR_FS, &[tex_entry(0)], SCRATCH_FORMAT)?;
        let normal = link(
            "normal",
            NORMAL_FS,
            &[tex_entry(0), uniform_entry(1, uniform_size)],
            OUTPUT_FORMAT,
        )?;
        let accumulate = link(
            "accumulate",
            ACCUMULATE_FS,
            &[tex_entry(0), tex_entry(1)],
            SCRATCH_FORMAT,
        )?;
        let resolve = link("resolve", RESOLVE_FS, &[tex_entry(0)], OUTPUT_FORMAT)?;

        let greyscale_uniforms = resources.create_uniform_buffer(
            "greyscale-uniforms",
            std::mem::size_of::<GreyscaleUniforms>() as u64,
        )?;
        let normal_uniforms = resources.create_uniform_buffer("normal-uniforms", uniform_size as u64)?;

        log::info!("Normal-map pipelines ready");
        Ok(Self {
            resources,
            greyscale,
            blur,
            normal,
            accumulate,
            resolve,
            greyscale_uniforms,
            normal_uniforms,
            source: None,
            scratch: None,
            accumulator: None,
            allocated: 0,
        })
    }

    /// The uploaded source texture (mip-mapped), for previews.
    pub fn source_texture(&self) -> Option<&GpuTexture> {
        self.source.as_ref().map(|s| &s.texture)
    }

    /// Uploads `source` unless this exact pixel buffer is already resident.
    pub fn upload_source(&mut self, source: &SourceImage) -> Result<(), EffectError> {
        if let Some(uploaded) = &self.source {
            if Arc::ptr_eq(&uploaded.pixels, &source.pixels) {
                return Ok(());
            }
        }
        let texture =
            self.resources
                .create_texture("source", &source.pixels, source.width, source.height)?;
        log::info!(
            "Uploaded source texture {}x{} ({} mip levels)",
            texture.width(),
            texture.height(),
            texture.mip_levels
        );
        self.source = Some(UploadedSource {
            pixels: Arc::clone(&source.pixels),
            texture,
        });
        Ok(())
    }

    fn ping_pong(
        resources: &ResourceProvider,
        slot: &mut Option<PingPongTarget>,
        label: &str,
        width: u32,
        height: u32,
    ) -> Result<(), EffectError> {
        if slot.as_ref().is_some_and(|p| p.size() == (width, height)) {
            return Ok(());
        }
        let a = resources.create_render_target(&format!("{label}-a"), width, height, SCRATCH_FORMAT)?;
        let b = resources.create_render_target(&format!("{label}-b"), width, height, SCRATCH_FORMAT)?;
        *slot = Some(PingPongTarget::new(a, b));
        Ok(())
    }

    /// Renders the full effect for `params` into `target`.
    fn render_layer(
        &mut self,
        source: &SourceImage,
        target: &RenderTarget,
        params: &ParameterSet,
        flip_y: bool,
    ) -> Result<(), EffectError> {
        self.upload_source(source)?;
        Self::ping_pong(
            &self.resources,
            &mut self.scratch,
            "height",
            source.width,
            source.height,
        )?;
        let (Some(src), Some(scratch)) = (self.source.as_ref(), self.scratch.as_mut()) else {
            return Ok(());
        };

        let greyscale_slot = self.greyscale.uniform("u")?.binding;
        let normal_slot = self.normal.uniform("u")?.binding;
        let resources = &self.resources;

        resources.checked("render-layer", |device| {
            resources.queue.write_buffer(
                &self.greyscale_uniforms,
                0,
                bytemuck::bytes_of(&GreyscaleUniforms::from_params(params)),
            );
            resources.queue.write_buffer(
                &self.normal_uniforms,
                0,
                bytemuck::bytes_of(&NormalUniforms::from_params(params, flip_y)),
            );

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render-layer-encoder"),
            });

            let bg = bind(
                device,
                &self.greyscale,
                &[
                    texture_binding(0, &src.texture.view),
                    BindGroupEntry {
                        binding: greyscale_slot,
                        resource: self.greyscale_uniforms.as_entire_binding(),
                    },
                ],
            );
            run_fullscreen_pass(
                &mut encoder,
                "greyscale",
                &self.greyscale.pipeline,
                &bg,
                &scratch.write_target().view,
            );

            for _ in 0..params.blur_passes {
                scratch.flip();
                let bg = bind(
                    device,
                    &self.blur,
                    &[texture_binding(0, &scratch.read_target().view)],
                );
                run_fullscreen_pass(
                    &mut encoder,
                    "blur",
                    &self.blur.pipeline,
                    &bg,
                    &scratch.write_target().view,
                );
            }

            let bg = bind(
                device,
                &self.normal,
                &[
                    texture_binding(0, &scratch.write_target().view),
                    BindGroupEntry {
                        binding: normal_slot,
                        resource: self.normal_uniforms.as_entire_binding(),
                    },
                ],
            );
            run_fullscreen_pass(
                &mut encoder,
                "normal",
                &self.normal.pipeline,
                &bg,
                &target.view,
            );

            resources.queue.submit(std::iter::once(encoder.finish()));
        })?;
        Ok(())
    }
}

impl EffectEngine for GpuNormalMapEngine {
    type Buffer = RenderTarget;

    fn generate(
        &mut self,
        source: &SourceImage,
        params: &ParameterSet,
        flip_y: bool,
    ) -> Result<GpuImage<RenderTarget>, EffectError> {
        self.allocated += 1;
        let target = self.resources.create_render_target(
            &format!("layer-{}", self.allocated),
            source.width,
            source.height,
            OUTPUT_FORMAT,
        )?;
        let image = GpuImage {
            width: target.width,
            height: target.height,
            buffer: target,
        };
        check_output(&image, source.width, source.height)?;
        self.render_layer(source, &image.buffer, params, flip_y)?;
        Ok(image)
    }

    fn regenerate(
        &mut self,
        source: &SourceImage,
        target: &mut GpuImage<RenderTarget>,
        params: &ParameterSet,
        flip_y: bool,
    ) -> Result<(), EffectError> {
        check_output(target, source.width, source.height)?;
        self.render_layer(source, &target.buffer, params, flip_y)
    }

    fn allocate(&mut self, width: u32, height: u32) -> Result<GpuImage<RenderTarget>, EffectError> {
        let target = self
            .resources
            .create_render_target("composite", width, height, OUTPUT_FORMAT)?;
        let image = GpuImage {
            width: target.width,
            height: target.height,
            buffer: target,
        };
        check_output(&image, width, height)?;
        Ok(image)
    }

    fn composite(
        &mut self,
        output: &mut GpuImage<RenderTarget>,
        layers: &[&GpuImage<RenderTarget>],
    ) -> Result<(), EffectError> {
        if layers.len() <= 1 {
            return Ok(());
        }
        for layer in layers {
            check_output(layer, output.width, output.height)?;
        }
        Self::ping_pong(
            &self.resources,
            &mut self.accumulator,
            "accumulator",
            output.width,
            output.height,
        )?;
        let Some(acc) = self.accumulator.as_mut() else {
            return Ok(());
        };
        let resources = &self.resources;

        resources.checked("composite", |device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("composite-encoder"),
            });
            clear_pass(&mut encoder, &acc.write_target().view);

            for layer in layers {
                acc.flip();
                let bg = bind(
                    device,
                    &self.accumulate,
                    &[
                        texture_binding(0, &acc.read_target().view),
                        texture_binding(1, &layer.buffer.view),
                    ],
                );
                run_fullscreen_pass(
                    &mut encoder,
                    "accumulate",
                    &self.accumulate.pipeline,
                    &bg,
                    &acc.write_target().view,
                );
            }

            let bg = bind(
                device,
                &self.resolve,
                &[texture_binding(0, &acc.write_target().view)],
            );
            run_fullscreen_pass(
                &mut encoder,
                "resolve",
                &self.resolve.pipeline,
                &bg,
                &output.buffer.view,
            );

            resources.queue.submit(std::iter::once(encoder.finish()));
        })?;
        Ok(())
    }

    fn read_pixels(&mut self, image: &GpuImage<RenderTarget>) -> Result<Vec<u8>, EffectError> {
        Ok(readback::read_target(&self.resources, &image.buffer)?)
    }

    fn drain_errors(&mut self) -> Vec<DriverError> {
        self.resources.drain_errors()
    }
}

fn texture_binding(binding: u32, view: &TextureView) -> BindGroupEntry<'_> {
    BindGroupEntry {
        binding,
        resource: BindingResource::TextureView(view),
    }
}

fn bind(device: &Device, program: &Program, entries: &[BindGroupEntry<'_>]) -> BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{}-bg", program.label)),
        layout: &program.bind_group_layout,
        entries,
    })
}

fn clear_pass(encoder: &mut CommandEncoder, view: &TextureView) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("accumulator-clear"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}
