use std::fmt;

use crate::effect::GpuImage;
use crate::params::ParameterSet;

/// Stable position of a layer. Layers are never removed, so an index handed
/// out once stays valid for the life of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerIndex(pub usize);

impl fmt::Display for LayerIndex {
    /// Zero-based, matching the order layers were added in.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayerError {
    #[error("no layer at index {index} (store has {len})")]
    UnknownLayer { index: usize, len: usize },
}

pub struct Layer<B> {
    /// Edited by the UI between frames.
    pub parameters: ParameterSet,
    applied: ParameterSet,
    pub image: GpuImage<B>,
    /// UI texture bound to `image`, registered once on first display.
    pub ui_handle: Option<egui::TextureId>,
}

impl<B> Layer<B> {
    /// A layer whose image was just produced from `parameters`.
    pub fn new(parameters: ParameterSet, image: GpuImage<B>) -> Self {
        Self {
            parameters,
            applied: parameters,
            image,
            ui_handle: None,
        }
    }

    /// Parameters the current image was generated with.
    pub fn last_applied(&self) -> &ParameterSet {
        &self.applied
    }

    pub fn is_dirty(&self) -> bool {
        self.parameters != self.applied
    }

    /// Only the frame loop calls this, after a successful regeneration.
    pub(crate) fn mark_applied(&mut self) {
        self.applied = self.parameters;
    }
}

/// Append-only, ordered layer arena. Order drives numbering and compositing.
pub struct LayerStore<B> {
    layers: Vec<Layer<B>>,
}

impl<B> Default for LayerStore<B> {
    fn default() -> Self {
        Self { layers: Vec::new() }
    }
}

impl<B> LayerStore<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: Layer<B>) -> LayerIndex {
        self.layers.push(layer);
        LayerIndex(self.layers.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn get(&self, index: LayerIndex) -> Result<&Layer<B>, LayerError> {
        let len = self.layers.len();
        self.layers.get(index.0).ok_or(LayerError::UnknownLayer {
            index: index.0,
            len,
        })
    }

    pub fn get_mut(&mut self, index: LayerIndex) -> Result<&mut Layer<B>, LayerError> {
        let len = self.layers.len();
        self.layers.get_mut(index.0).ok_or(LayerError::UnknownLayer {
            index: index.0,
            len,
        })
    }

    /// Applies a UI edit. No range checks here; widgets own their ranges.
    pub fn mutate_parameters(
        &mut self,
        index: LayerIndex,
        edit: impl FnOnce(&mut ParameterSet),
    ) -> Result<(), LayerError> {
        edit(&mut self.get_mut(index)?.parameters);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerIndex, &Layer<B>)> {
        self.layers.iter().enumerate().map(|(i, l)| (LayerIndex(i), l))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (LayerIndex, &mut Layer<B>)> {
        self.layers
            .iter_mut()
            .enumerate()
            .map(|(i, l)| (LayerIndex(i), l))
    }

    /// Every layer image, in store order.
    pub fn images(&self) -> Vec<&GpuImage<B>> {
        self.layers.iter().map(|l| &l.image).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(tag: u32) -> GpuImage<u32> {
        GpuImage {
            width: 4,
            height: 4,
            buffer: tag,
        }
    }

    #[test]
    fn push_returns_sequential_indices() {
        let mut store = LayerStore::new();
        for i in 0..4 {
            let idx = store.push(Layer::new(ParameterSet::default(), image(i)));
            assert_eq!(idx, LayerIndex(i as usize));
        }
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn new_layer_is_clean() {
        let layer = Layer::new(ParameterSet::default(), image(0));
        assert!(!layer.is_dirty());
        assert_eq!(layer.last_applied(), &ParameterSet::default());
        assert!(layer.ui_handle.is_none());
    }

    #[test]
    fn mutate_marks_dirty_until_applied() {
        let mut store = LayerStore::new();
        let idx = store.push(Layer::new(ParameterSet::default(), image(0)));
        store.mutate_parameters(idx, |p| p.scale = 5.0).unwrap();
        assert!(store.get(idx).unwrap().is_dirty());

        store.get_mut(idx).unwrap().mark_applied();
        let layer = store.get(idx).unwrap();
        assert!(!layer.is_dirty());
        assert_eq!(layer.last_applied().scale, 5.0);
    }

    #[test]
    fn edit_back_to_snapshot_is_clean() {
        let mut store = LayerStore::new();
        let idx = store.push(Layer::new(ParameterSet::default(), image(0)));
        store.mutate_parameters(idx, |p| p.blur_passes = 9).unwrap();
        store.mutate_parameters(idx, |p| p.blur_passes = 2).unwrap();
        assert!(!store.get(idx).unwrap().is_dirty());
    }

    #[test]
    fn unknown_index_is_an_error() {
        let mut store: LayerStore<u32> = LayerStore::new();
        assert_eq!(
            store.mutate_parameters(LayerIndex(3), |p| p.scale = 2.0),
            Err(LayerError::UnknownLayer { index: 3, len: 0 })
        );
        assert!(store.get(LayerIndex(0)).is_err());
    }

    #[test]
    fn images_follow_store_order() {
        let mut store = LayerStore::new();
        for tag in [7, 3, 9] {
            store.push(Layer::new(ParameterSet::default(), image(tag)));
        }
        let tags: Vec<u32> = store.images().iter().map(|i| i.buffer).collect();
        assert_eq!(tags, vec![7, 3, 9]);
    }

    #[test]
    fn index_display_is_zero_based() {
        assert_eq!(LayerIndex(0).to_string(), "0");
        assert_eq!(LayerIndex(4).to_string(), "4");
    }
}
