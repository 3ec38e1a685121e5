//! Engine-wide defaults. Keeping them in a single place makes it easier to
//! tweak the magic numbers that tune caching, gestures and frame pacing.

/// Square size, in screen pixels, at which one tile is displayed.
pub const TILE_DISPLAY_SIZE: f64 = 256.0;

/// Side of the rasterized tile buffer, in pixels.
pub const RASTER_SIZE: u32 = 512;

/// Coordinate extent of a vector tile layer when the payload omits it.
pub const DEFAULT_TILE_EXTENT: u32 = 4096;

/// Resident textures kept before LRU eviction starts.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Decoded tiles that may wait for upload before producers block.
pub const DEFAULT_UPLOAD_QUEUE: usize = 64;

/// Texture uploads performed per frame.
pub const DEFAULT_UPLOADS_PER_FRAME: usize = 4;

pub const DEFAULT_MIN_ZOOM: u8 = 3;
pub const DEFAULT_MAX_ZOOM: u8 = 14;

/// Per-frame velocity multiplier applied to an active fling.
pub const FLING_FRICTION: f64 = 0.9;

/// Fling speed, in pixels per second, below which the fling stops.
pub const FLING_STOP_SPEED: f64 = 10.0;

/// Nominal interval between live position samples (20 Hz).
pub const POSITION_SAMPLE_INTERVAL_MS: u64 = 50;

/// Frame budget at 60 fps.
pub const FRAME_BUDGET_MS: u64 = 16;
