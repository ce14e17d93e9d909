pub mod layout;
pub mod renderer;
mod text;

pub use layout::{PageGeometry, PageLayout, PanelPlacement};
pub use renderer::Compositor;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("cannot compose an empty page")]
    EmptyPage,
    #[error("{count} panels exceed the page capacity of {capacity}")]
    TooManyPanels { count: usize, capacity: usize },
    #[error("cannot decode panel image '{name}': {reason}")]
    Decode { name: String, reason: String },
    #[error("caption font error: {0}")]
    Font(String),
    #[error("cannot encode composed page: {0}")]
    Encode(String),
    #[error("canvas {0}x{1} exceeds the raster backend limit")]
    CanvasTooLarge(u32, u32),
}
