pub mod camera;
pub mod context;
pub mod overlay;
pub mod palette;
#[cfg(feature = "render")]
pub mod pipeline;
pub mod raster;
pub mod renderer;

pub use camera::ViewTransform;
pub use context::{DrawCommand, GpuContext, RecordingContext, TextureHandle, ViewportRect};
pub use overlay::{MapOverlay, OverlayFrame, OwnshipOverlay, RangeRingsOverlay};
#[cfg(feature = "render")]
pub use pipeline::WgpuContext;
pub use raster::{Rasterizer, TileRaster};
pub use renderer::{FrameStats, PositionInput, Renderer};
