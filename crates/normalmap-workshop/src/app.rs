use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use winit::window::Window;

use crate::cli::Cli;
use crate::effect::EffectEngine;
use crate::frame::{FrameActions, FrameError, FrameHost, PipelineError, UiFrame, Workshop};
use crate::gpu::render_target::RenderTarget;
use crate::gpu::{GpuContext, GpuNormalMapEngine};
use crate::layer::LayerIndex;
use crate::settings::SettingsConfig;
use crate::source::SourceImage;
use crate::ui::EguiOverlay;
use crate::ui::panels::{self, PanelState, PreviewTextures};

/// The windowed side of a frame: egui input, panels and presentation.
pub struct WindowHost {
    pub window: Arc<Window>,
    pub gpu: GpuContext,
    pub overlay: EguiOverlay,
    pub panels: PanelState,
    albedo: Option<egui::TextureId>,
    composite: Option<egui::TextureId>,
    background: [f32; 3],
}

impl WindowHost {
    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.overlay
            .resize(width, height, self.window.scale_factor() as f32);
    }
}

impl FrameHost<RenderTarget> for WindowHost {
    fn poll_input(&mut self) {
        self.overlay.begin_frame(&self.window);
    }

    fn render_ui(&mut self, frame: UiFrame<'_, RenderTarget>) -> FrameActions {
        let resources = Rc::clone(&self.gpu.resources);

        // Layer targets and the composite are updated in place, so one
        // registration per texture is enough.
        for (_, layer) in frame.layers.iter_mut() {
            if layer.ui_handle.is_none() {
                layer.ui_handle = Some(
                    self.overlay
                        .register_texture(&resources.device, &layer.image.buffer.view),
                );
            }
        }
        if let (Some(composite), None) = (frame.composite, self.composite) {
            self.composite = Some(
                self.overlay
                    .register_texture(&resources.device, &composite.buffer.view),
            );
        }

        let result = match frame.composite {
            Some(_) => self.composite,
            None => frame
                .layers
                .get(LayerIndex(0))
                .ok()
                .and_then(|l| l.ui_handle),
        };
        let previews = PreviewTextures {
            albedo: self.albedo,
            result,
        };

        let ctx = self.overlay.context();
        let actions = panels::draw_panels(&ctx, &mut self.panels, frame, previews);
        if self.panels.theme != self.overlay.theme {
            self.overlay.set_theme(self.panels.theme);
        }
        self.overlay.end_frame(&self.window);
        actions
    }

    fn present(&mut self) -> Result<(), PipelineError> {
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.window.inner_size();
                self.resize(size.width, size.height);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface timeout, skipping present");
                return Ok(());
            }
            Err(e) => return Err(PipelineError::Present(e.to_string())),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let [r, g, b] = self.background;
        let resources = Rc::clone(&self.gpu.resources);
        resources.tracked("present", |device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present-encoder"),
            });
            {
                let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("background-clear"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color {
                                r: r as f64,
                                g: g as f64,
                                b: b as f64,
                                a: 1.0,
                            }),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            }
            self.overlay
                .render(device, &resources.queue, &mut encoder, &view);
            resources.queue.submit(std::iter::once(encoder.finish()));
        });

        output.present();
        Ok(())
    }
}

pub struct App {
    pub workshop: Workshop<GpuNormalMapEngine>,
    pub host: WindowHost,
    pub settings: SettingsConfig,
    pub quit_requested: bool,
}

impl App {
    pub fn new(window: Arc<Window>, cli: &Cli, mut settings: SettingsConfig) -> Result<Self> {
        let gpu = GpuContext::new(window.clone())?;
        let source = SourceImage::load(&cli.source)?;

        let mut engine = GpuNormalMapEngine::new(Rc::clone(&gpu.resources))
            .context("failed to build normal-map pipelines")?;
        engine.upload_source(&source)?;

        let mut overlay = EguiOverlay::new(&gpu.resources.device, gpu.format, &window, settings.theme);
        let albedo = engine
            .source_texture()
            .map(|tex| {
                overlay.register_sampled_texture(
                    &gpu.resources.device,
                    &tex.view,
                    tex.sampler_descriptor(),
                )
            });

        if let Some(output) = &cli.output {
            settings.output_path = output.clone();
        }
        let flip_y = cli.flip_y || settings.flip_y;
        let mut workshop = Workshop::new(engine, source, flip_y);
        for params in cli.initial_layers() {
            workshop.add_layer(params)?;
        }
        workshop.engine.assert_no_errors()?;

        let host = WindowHost {
            window,
            gpu,
            overlay,
            panels: PanelState::from_settings(&settings),
            albedo,
            composite: None,
            background: settings.background,
        };

        Ok(Self {
            workshop,
            host,
            settings,
            quit_requested: false,
        })
    }

    pub fn frame(&mut self) -> Result<(), FrameError> {
        let outcome = self.workshop.run_frame(&mut self.host)?;
        if let Some(added) = outcome.added {
            log::debug!("Layer {added} added this frame");
        }
        Ok(())
    }

    /// Persists UI choices for the next session.
    pub fn save_settings(&mut self) {
        self.host.panels.store_into(&mut self.settings);
        self.settings.flip_y = self.workshop.flip_y;
        let size = self
            .host
            .window
            .inner_size()
            .to_logical::<u32>(self.host.window.scale_factor());
        self.settings.window_width = size.width;
        self.settings.window_height = size.height;
        self.settings.save();
    }
}
