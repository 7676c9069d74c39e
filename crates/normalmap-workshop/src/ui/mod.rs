pub mod overlay;
pub mod panels;
pub mod theme;

pub use overlay::EguiOverlay;
