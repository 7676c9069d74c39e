use super::store::{LayerIndex, LayerStore};

/// Layers whose parameters diverged from their last-applied snapshot, in
/// store order.
pub fn dirty_layers<B>(store: &LayerStore<B>) -> Vec<LayerIndex> {
    store
        .iter()
        .filter(|(_, layer)| layer.is_dirty())
        .map(|(idx, _)| idx)
        .collect()
}

/// Every layer, for a forced re-apply (global setting changes).
pub fn all_layers<B>(store: &LayerStore<B>) -> Vec<LayerIndex> {
    store.iter().map(|(idx, _)| idx).collect()
}
