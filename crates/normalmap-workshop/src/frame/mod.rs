//! The per-frame state machine:
//!
//! `Idle -> PollInput -> RenderUi -> DetectChanges -> RegenerateDirty ->
//! Composite -> Save -> Present -> Idle`
//!
//! Dirtiness is cleared only in `RegenerateDirty`, and only after the effect
//! succeeded for that layer. `Composite` runs only on frames that regenerated
//! something. Any error ends the frame with the phase it happened in.

pub mod compositor;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::effect::{EffectEngine, EffectError, GpuImage};
use crate::gpu::error::DriverErrors;
use crate::layer::{Layer, LayerError, LayerIndex, LayerStore, changes};
use crate::params::ParameterSet;
use crate::source::{self, SourceImage};

pub use compositor::Compositor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    PollInput,
    RenderUi,
    DetectChanges,
    RegenerateDirty,
    Composite,
    Save,
    Present,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::Idle => "idle",
            FramePhase::PollInput => "input polling",
            FramePhase::RenderUi => "UI",
            FramePhase::DetectChanges => "change detection",
            FramePhase::RegenerateDirty => "layer regeneration",
            FramePhase::Composite => "compositing",
            FramePhase::Save => "save",
            FramePhase::Present => "present",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Effect(#[from] EffectError),
    #[error(transparent)]
    Driver(#[from] DriverErrors),
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error("present failed: {0}")]
    Present(String),
    #[error("nothing to save: no layers")]
    NothingToSave,
    #[error("failed to save {}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("frame {frame} failed during {phase}")]
pub struct FrameError {
    pub frame: u64,
    pub phase: FramePhase,
    #[source]
    pub source: PipelineError,
}

/// Discrete UI events collected during one frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameActions {
    /// Re-apply every layer (e.g. after toggling the global flip).
    pub apply: bool,
    pub add_layer: Option<ParameterSet>,
    pub save: Option<PathBuf>,
}

/// What the UI may read and edit while it draws.
pub struct UiFrame<'a, B> {
    pub layers: &'a mut LayerStore<B>,
    pub flip_y: &'a mut bool,
    pub source: &'a SourceImage,
    pub composite: Option<&'a GpuImage<B>>,
}

/// The window, UI and display side of a frame.
pub trait FrameHost<B> {
    fn poll_input(&mut self);
    fn render_ui(&mut self, frame: UiFrame<'_, B>) -> FrameActions;
    fn present(&mut self) -> Result<(), PipelineError>;
}

/// What happened during one frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameOutcome {
    pub regenerated: Vec<LayerIndex>,
    pub added: Option<LayerIndex>,
    pub composited: bool,
    pub saved: Option<PathBuf>,
}

/// Source image, layers and compositor, driven one frame at a time.
pub struct Workshop<E: EffectEngine> {
    pub engine: E,
    source: SourceImage,
    layers: LayerStore<E::Buffer>,
    compositor: Compositor<E::Buffer>,
    pub flip_y: bool,
    frame: u64,
    phase: FramePhase,
}

impl<E: EffectEngine> Workshop<E> {
    pub fn new(engine: E, source: SourceImage, flip_y: bool) -> Self {
        Self {
            engine,
            source,
            layers: LayerStore::new(),
            compositor: Compositor::new(),
            flip_y,
            frame: 0,
            phase: FramePhase::Idle,
        }
    }

    pub fn layers(&self) -> &LayerStore<E::Buffer> {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut LayerStore<E::Buffer> {
        &mut self.layers
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Runs the effect once for a new layer and appends it.
    pub fn add_layer(&mut self, params: ParameterSet) -> Result<LayerIndex, PipelineError> {
        let start = Instant::now();
        let image = self.engine.generate(&self.source, &params, self.flip_y)?;
        let index = self.layers.push(Layer::new(params, image));
        log::info!(
            "Added layer {index} ({:?}) in {:.1}ms",
            params,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(index)
    }

    pub fn dirty_layers(&self) -> Vec<LayerIndex> {
        changes::dirty_layers(&self.layers)
    }

    /// Regenerates each listed layer in place, then records its parameters
    /// as applied.
    pub fn regenerate(&mut self, indices: &[LayerIndex]) -> Result<(), PipelineError> {
        if indices.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        for &index in indices {
            let layer = self.layers.get_mut(index)?;
            let params = layer.parameters;
            self.engine
                .regenerate(&self.source, &mut layer.image, &params, self.flip_y)?;
            layer.mark_applied();
        }
        log::debug!(
            "Regenerated {} layer(s) in {:.1}ms",
            indices.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Returns whether a composite actually ran.
    pub fn recomposite(&mut self) -> Result<bool, PipelineError> {
        let start = Instant::now();
        let ran = self.compositor.composite(&mut self.engine, &self.layers)?;
        if ran {
            log::debug!(
                "Composited {} layers in {:.1}ms",
                self.layers.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        Ok(ran)
    }

    /// The image a user sees as the result: the composite once one exists,
    /// otherwise the first layer.
    pub fn output(&self) -> Option<&GpuImage<E::Buffer>> {
        if self.layers.len() > 1 {
            if let Some(composite) = self.compositor.output() {
                return Some(composite);
            }
        }
        self.layers.get(LayerIndex(0)).ok().map(|l| &l.image)
    }

    /// Writes the composite, bringing it up to date first if layers were
    /// added since the last blend. A single layer is written as-is.
    pub fn save(&mut self, path: &Path) -> Result<(), PipelineError> {
        if self.compositor.is_stale(&self.layers) {
            self.recomposite()?;
        }
        let output = match (self.layers.len(), self.compositor.output()) {
            (0, _) => return Err(PipelineError::NothingToSave),
            (n, Some(composite)) if n > 1 => composite,
            _ => &self.layers.get(LayerIndex(0))?.image,
        };
        let (width, height) = output.size();
        let pixels = self.engine.read_pixels(output)?;
        source::save_rgba(path, width, height, pixels).map_err(|source| PipelineError::Save {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Saved {width}x{height} normal map to {}", path.display());
        Ok(())
    }

    fn enter(&mut self, phase: FramePhase) {
        self.phase = phase;
    }

    fn fail(&self, source: impl Into<PipelineError>) -> FrameError {
        FrameError {
            frame: self.frame,
            phase: self.phase,
            source: source.into(),
        }
    }

    /// One pass through the frame state machine.
    pub fn run_frame<H>(&mut self, host: &mut H) -> Result<FrameOutcome, FrameError>
    where
        H: FrameHost<E::Buffer>,
    {
        self.frame += 1;
        let mut outcome = FrameOutcome::default();

        self.enter(FramePhase::PollInput);
        host.poll_input();

        self.enter(FramePhase::RenderUi);
        let composite = if self.layers.len() > 1 {
            self.compositor.output()
        } else {
            None
        };
        let actions = host.render_ui(UiFrame {
            layers: &mut self.layers,
            flip_y: &mut self.flip_y,
            source: &self.source,
            composite,
        });
        if let Some(params) = actions.add_layer {
            outcome.added = Some(self.add_layer(params).map_err(|e| self.fail(e))?);
        }

        self.enter(FramePhase::DetectChanges);
        let dirty = if actions.apply {
            changes::all_layers(&self.layers)
        } else {
            self.dirty_layers()
        };

        self.enter(FramePhase::RegenerateDirty);
        self.regenerate(&dirty).map_err(|e| self.fail(e))?;

        self.enter(FramePhase::Composite);
        if !dirty.is_empty() {
            outcome.composited = self.recomposite().map_err(|e| self.fail(e))?;
        }
        outcome.regenerated = dirty;

        if let Some(path) = actions.save {
            self.enter(FramePhase::Save);
            self.save(&path).map_err(|e| self.fail(e))?;
            outcome.saved = Some(path);
        }

        self.enter(FramePhase::Present);
        host.present().map_err(|e| self.fail(e))?;
        self.engine.assert_no_errors().map_err(|e| self.fail(e))?;

        self.enter(FramePhase::Idle);
        Ok(outcome)
    }
}
