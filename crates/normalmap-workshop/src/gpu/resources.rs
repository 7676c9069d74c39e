use std::cell::RefCell;

use naga::ShaderStage;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BufferBindingType, ColorTargetState,
    CommandEncoder, Device, FragmentState, PipelineCompilationOptions, PipelineLayoutDescriptor,
    PrimitiveState, Queue, RenderPipeline, SamplerBindingType, ShaderModule, ShaderStages,
    Texture, TextureFormat, TextureSampleType, TextureView, TextureViewDimension, VertexState,
};

use super::error::{DriverError, DriverErrors, ResourceError};
use super::fullscreen_quad::FULLSCREEN_TRIANGLE_VS_WITH_UV;
use super::render_target::RenderTarget;
use super::shader::{self, UniformBinding, ValidatedShader, MIP_BLIT_FS};

/// A validated shader plus the device module built from it.
pub struct CompiledShader {
    pub info: ValidatedShader,
    pub module: ShaderModule,
}

/// A linked vertex + fragment pair drawing a fullscreen triangle into one
/// colour target, with a single bind group at slot 0.
pub struct Program {
    pub label: String,
    pub pipeline: RenderPipeline,
    pub bind_group_layout: BindGroupLayout,
    fragment: ValidatedShader,
}

impl Program {
    pub fn uniform(&self, name: &str) -> Result<UniformBinding, ResourceError> {
        self.fragment.uniform(name)
    }
}

/// Sampled RGBA8 texture with a full mip chain.
pub struct GpuTexture {
    texture: Texture,
    pub view: TextureView,
    pub mip_levels: u32,
}

impl GpuTexture {
    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    /// How previews should sample this texture: tiled, trilinear.
    pub fn sampler_descriptor(&self) -> wgpu::SamplerDescriptor<'static> {
        tiling_sampler(self.mip_levels)
    }
}

/// Repeat addressing with linear filtering; mip filtering only when there
/// is more than one level to blend between.
pub fn tiling_sampler(mip_levels: u32) -> wgpu::SamplerDescriptor<'static> {
    let mipmap_filter = if mip_levels > 1 {
        wgpu::FilterMode::Linear
    } else {
        wgpu::FilterMode::Nearest
    };
    wgpu::SamplerDescriptor {
        label: Some("tiling-sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter,
        ..Default::default()
    }
}

/// Owns the device and queue; every GPU object is created through here.
///
/// Mutating calls run inside validation and out-of-memory error scopes.
/// `checked` calls fail immediately; `tracked` calls queue their errors until
/// [`ResourceProvider::drain_errors`].
pub struct ResourceProvider {
    pub device: Device,
    pub queue: Queue,
    pending: RefCell<Vec<DriverError>>,
    mip_blit: Option<Program>,
}

impl ResourceProvider {
    pub fn new(device: Device, queue: Queue) -> Result<Self, ResourceError> {
        let mut provider = Self {
            device,
            queue,
            pending: RefCell::new(Vec::new()),
            mip_blit: None,
        };
        let vs = provider.compile_shader(
            ShaderStage::Vertex,
            "mip-blit-vs",
            FULLSCREEN_TRIANGLE_VS_WITH_UV,
        )?;
        let fs = provider.compile_shader(ShaderStage::Fragment, "mip-blit-fs", MIP_BLIT_FS)?;
        provider.mip_blit = Some(provider.link_program(
            "mip-blit",
            &vs,
            &fs,
            &[tex_entry(0), sampler_entry(1)],
            TextureFormat::Rgba8Unorm,
        )?);
        Ok(provider)
    }

    /// Runs `f` inside error scopes and returns every captured error.
    fn scoped<T>(&self, f: impl FnOnce(&Device) -> T) -> (T, Vec<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        (value, validation.into_iter().chain(oom).collect())
    }

    /// Runs `f` and fails right away if the driver reported anything.
    pub fn checked<T>(&self, label: &str, f: impl FnOnce(&Device) -> T) -> Result<T, DriverErrors> {
        let (value, errors) = self.scoped(f);
        DriverErrors::check(
            errors
                .iter()
                .map(|e| DriverError::from_wgpu(label, e))
                .collect(),
        )?;
        Ok(value)
    }

    /// Runs `f`, queueing any driver errors for the next drain.
    pub fn tracked<T>(&self, label: &str, f: impl FnOnce(&Device) -> T) -> T {
        let (value, errors) = self.scoped(f);
        if !errors.is_empty() {
            let mut pending = self.pending.borrow_mut();
            for err in &errors {
                let err = DriverError::from_wgpu(label, err);
                log::error!("{err}");
                pending.push(err);
            }
        }
        value
    }

    /// Every error queued since the last drain, oldest first.
    pub fn drain_errors(&self) -> Vec<DriverError> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn compile_shader(
        &self,
        stage: ShaderStage,
        label: &str,
        source: &str,
    ) -> Result<CompiledShader, ResourceError> {
        let info = shader::validate_shader(stage, label, source)?;
        let module = self
            .checked(label, |device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
            })
            .map_err(|errors| ResourceError::ShaderCompile {
                stage,
                label: label.to_string(),
                diagnostic: errors.to_string(),
            })?;
        Ok(CompiledShader { info, module })
    }

    pub fn link_program(
        &self,
        label: &str,
        vertex: &CompiledShader,
        fragment: &CompiledShader,
        entries: &[BindGroupLayoutEntry],
        target_format: TextureFormat,
    ) -> Result<Program, ResourceError> {
        shader::check_link(label, &vertex.info, &fragment.info)?;

        let (pipeline, bind_group_layout) = self
            .checked(label, |device| {
                let bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
                    label: Some(&format!("{label}-bgl")),
                    entries,
                });
                let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
                    label: Some(&format!("{label}-layout")),
                    bind_group_layouts: &[&bgl],
                    push_constant_ranges: &[],
                });
                let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(&format!("{label}-pipeline")),
                    layout: Some(&pipeline_layout),
                    vertex: VertexState {
                        module: &vertex.module,
                        entry_point: Some(vertex.info.entry_point.as_str()),
                        buffers: &[],
                        compilation_options: PipelineCompilationOptions::default(),
                    },
                    fragment: Some(FragmentState {
                        module: &fragment.module,
                        entry_point: Some(fragment.info.entry_point.as_str()),
                        targets: &[Some(ColorTargetState {
                            format: target_format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: PipelineCompilationOptions::default(),
                    }),
                    primitive: PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                });
                (pipeline, bgl)
            })
            .map_err(|errors| ResourceError::ProgramLink {
                label: label.to_string(),
                diagnostic: errors.to_string(),
            })?;

        log::debug!("Linked program '{label}'");
        Ok(Program {
            label: label.to_string(),
            pipeline,
            bind_group_layout,
            fragment: fragment.info.clone(),
        })
    }

    fn check_dimensions(&self, label: &str, width: u32, height: u32) -> Result<(), ResourceError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(ResourceError::InvalidDimensions {
                label: label.to_string(),
                width,
                height,
            });
        }
        Ok(())
    }

    /// Uploads RGBA8 pixels with repeat addressing and trilinear filtering,
    /// then fills every mip level from the one above.
    pub fn create_texture(
        &self,
        label: &str,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<GpuTexture, ResourceError> {
        self.check_dimensions(label, width, height)?;
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(ResourceError::PixelDataSize {
                label: label.to_string(),
                expected,
                actual: pixels.len(),
            });
        }

        let mip_levels = mip_level_count(width, height);
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = self.checked(label, |device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: mip_levels,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                size,
            );
            texture
        })?;

        self.generate_mips(label, &texture, mip_levels)?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture {
            texture,
            view,
            mip_levels,
        })
    }

    fn generate_mips(&self, label: &str, texture: &Texture, mip_levels: u32) -> Result<(), ResourceError> {
        let Some(blit) = self.mip_blit.as_ref() else {
            return Ok(());
        };
        if mip_levels <= 1 {
            return Ok(());
        }

        self.checked(label, |device| {
            let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("mip-blit-sampler"),
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            });
            let level_view = |level: u32| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("mip-level"),
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            };

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mip-gen-encoder"),
            });
            for level in 1..mip_levels {
                let src = level_view(level - 1);
                let dst = level_view(level);
                let bind_group = device.create_bind_group(&BindGroupDescriptor {
                    label: Some("mip-blit-bg"),
                    layout: &blit.bind_group_layout,
                    entries: &[
                        BindGroupEntry {
                            binding: 0,
                            resource: BindingResource::TextureView(&src),
                        },
                        BindGroupEntry {
                            binding: 1,
                            resource: BindingResource::Sampler(&blit_sampler),
                        },
                    ],
                });
                run_fullscreen_pass(&mut encoder, "mip-blit", &blit.pipeline, &bind_group, &dst);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        })?;
        log::debug!("Generated {mip_levels} mip levels for '{label}'");
        Ok(())
    }

    pub fn create_render_target(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<RenderTarget, ResourceError> {
        self.check_dimensions(label, width, height)?;
        Ok(self.checked(label, |device| {
            RenderTarget::new(device, width, height, format, label)
        })?)
    }

    pub fn create_uniform_buffer(&self, label: &str, size: u64) -> Result<wgpu::Buffer, ResourceError> {
        Ok(self.checked(label, |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?)
    }
}

/// Levels down to 1x1 for the larger side.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

pub(crate) fn tex_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable: true },
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn sampler_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Sampler(SamplerBindingType::Filtering),
        count: None,
    }
}

pub(crate) fn uniform_entry(binding: u32, size: usize) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: std::num::NonZeroU64::new(size as u64),
        },
        count: None,
    }
}

pub(crate) fn run_fullscreen_pass(
    encoder: &mut CommandEncoder,
    label: &str,
    pipeline: &RenderPipeline,
    bind_group: &BindGroup,
    target: &TextureView,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
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
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}
