use crate::effect::{EffectEngine, EffectError, GpuImage};
use crate::layer::LayerStore;

/// Owns the composite buffer. It only exists once there are at least two
/// layers to blend, and is reused in place after that.
pub struct Compositor<B> {
    output: Option<GpuImage<B>>,
    /// Layer count the current output was blended from.
    blended: usize,
}

impl<B> Default for Compositor<B> {
    fn default() -> Self {
        Self {
            output: None,
            blended: 0,
        }
    }
}

impl<B> Compositor<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> Option<&GpuImage<B>> {
        self.output.as_ref()
    }

    /// True when layers were added since the last blend. Parameter edits
    /// always recomposite in the same frame, so the count is enough.
    pub fn is_stale(&self, layers: &LayerStore<B>) -> bool {
        layers.len() > 1 && (self.output.is_none() || self.blended != layers.len())
    }

    /// Blends every layer into the composite buffer. Returns `false` without
    /// touching the engine when there is nothing to blend.
    pub fn composite<E>(&mut self, engine: &mut E, layers: &LayerStore<B>) -> Result<bool, EffectError>
    where
        E: EffectEngine<Buffer = B>,
    {
        if layers.len() <= 1 {
            return Ok(false);
        }
        let images = layers.images();
        let output = match self.output.take() {
            Some(output) => output,
            None => {
                let (w, h) = images[0].size();
                log::debug!("Allocating {w}x{h} composite buffer");
                engine.allocate(w, h)?
            }
        };
        let output = self.output.insert(output);
        engine.composite(output, &images)?;
        self.blended = layers.len();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::CpuNormalMapEngine;
    use crate::layer::Layer;
    use crate::params::ParameterSet;
    use crate::source::SourceImage;

    fn store(engine: &mut CpuNormalMapEngine, n: usize) -> LayerStore<crate::effect::cpu::CpuBuffer> {
        let src = SourceImage::solid(4, 4, [90, 90, 90, 255]);
        let mut store = LayerStore::new();
        for _ in 0..n {
            let params = ParameterSet::default();
            let image = engine.generate(&src, &params, false).unwrap();
            store.push(Layer::new(params, image));
        }
        store
    }

    #[test]
    fn single_layer_never_reaches_engine() {
        let mut engine = CpuNormalMapEngine::new();
        let layers = store(&mut engine, 1);
        let mut compositor = Compositor::new();
        assert!(!compositor.composite(&mut engine, &layers).unwrap());
        assert_eq!(engine.calls.composite, 0);
        assert!(compositor.output().is_none());
    }

    #[test]
    fn output_is_allocated_once_and_reused() {
        let mut engine = CpuNormalMapEngine::new();
        let layers = store(&mut engine, 2);
        let mut compositor = Compositor::new();

        assert!(compositor.composite(&mut engine, &layers).unwrap());
        let id = compositor.output().unwrap().buffer.id;
        assert!(compositor.composite(&mut engine, &layers).unwrap());
        assert_eq!(compositor.output().unwrap().buffer.id, id);
        assert_eq!(engine.calls.composite, 2);
        assert_eq!(compositor.output().unwrap().size(), (4, 4));
    }

    #[test]
    fn added_layer_makes_output_stale() {
        let mut engine = CpuNormalMapEngine::new();
        let mut layers = store(&mut engine, 2);
        let mut compositor = Compositor::new();
        assert!(compositor.is_stale(&layers));
        compositor.composite(&mut engine, &layers).unwrap();
        assert!(!compositor.is_stale(&layers));

        let src = SourceImage::solid(4, 4, [90, 90, 90, 255]);
        let params = ParameterSet::default();
        let image = engine.generate(&src, &params, false).unwrap();
        layers.push(Layer::new(params, image));
        assert!(compositor.is_stale(&layers));
    }

    #[test]
    fn single_layer_is_never_stale() {
        let mut engine = CpuNormalMapEngine::new();
        let layers = store(&mut engine, 1);
        assert!(!Compositor::new().is_stale(&layers));
    }
}
