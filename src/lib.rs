//! # movingmap
//!
//! A moving-map engine for offline vector tiles.
//!
//! The library decodes and rasterizes tiles on background workers, keeps a
//! bounded set of them resident as GPU textures, and draws the visible set
//! every frame under a view that follows gestures and a live position feed.

pub mod animation;
pub mod core;
pub mod data;
pub mod input;
pub mod prelude;
pub mod rendering;
pub mod runtime;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    config::MapEngineConfig,
    geo::{LatLng, PlanarRect, Point, TileCoord},
    viewport::{OrientationMode, SharedView, ViewState},
};

pub use animation::position::{PositionInterpolator, PositionSample};

pub use input::gestures::{GestureEvent, GestureInput};

pub use rendering::{
    context::{GpuContext, RecordingContext, TextureHandle},
    raster::{Rasterizer, TileRaster},
    renderer::{FrameStats, PositionInput, Renderer},
};

pub use tiles::{
    cache::{TileCache, TileState},
    source::{DirectoryTileStore, MemoryTileStore, RowConvention, TileStore},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = MapError;

/// Installs the `env_logger` backend for the `log` facade.
///
/// Safe to call more than once; later calls are ignored.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
