//! Prelude module for common movingmap types and traits
//!
//! Re-exports the types most hosts need, for `use movingmap::prelude::*;`

pub use crate::core::{
    config::{
        FrameTimingConfig, MapEngineConfig, MapPerformanceProfile, PositionConfig, RasterConfig,
        TileCacheConfig, ViewConfig,
    },
    geo::{LatLng, PlanarRect, Point, TileCoord},
    viewport::{OrientationMode, SharedView, ViewState},
};

pub use crate::animation::{LiveSample, PositionInterpolator, PositionSample};

pub use crate::input::{GestureEvent, GestureInput};

pub use crate::rendering::{
    context::{GpuContext, RecordingContext, TextureHandle},
    overlay::MapOverlay,
    raster::{Rasterizer, TileRaster},
    renderer::{FrameStats, PositionInput, Renderer},
};

pub use crate::tiles::{
    cache::{CacheStats, TileCache, TileState},
    source::{DirectoryTileStore, MemoryTileStore, RowConvention, TileStore},
};

pub use crate::runtime::{default_spawner, InlineSpawner, ThreadSpawner, TileSpawner};

#[cfg(feature = "tokio-runtime")]
pub use crate::runtime::TokioSpawner;

pub use crate::{Error as MapError, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
