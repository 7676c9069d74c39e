pub mod changes;
pub mod store;

pub use store::{Layer, LayerError, LayerIndex, LayerStore};
