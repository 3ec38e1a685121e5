//! Configuration for the moving-map engine
//!
//! Options are grouped by subsystem and can be taken from a preset profile,
//! built in code, or loaded from JSON. Every group has sensible defaults so a
//! partial JSON document only needs the fields it changes.

use crate::core::constants::*;
use crate::core::geo::LatLng;
use crate::tiles::source::RowConvention;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum MapPerformanceProfile {
    #[default]
    Balanced,
    LowMemory,
    HighQuality,
    Custom(MapEngineConfig),
}

impl MapPerformanceProfile {
    pub fn resolve(&self) -> MapEngineConfig {
        match self {
            Self::Balanced => MapEngineConfig::default(),
            Self::LowMemory => MapEngineConfig {
                tile_cache: TileCacheConfig {
                    capacity: 96,
                    upload_queue_len: 24,
                    uploads_per_frame: 2,
                    ..TileCacheConfig::default()
                },
                frame: FrameTimingConfig {
                    target_fps: Some(30),
                    frame_budget_ms: 33,
                },
                raster: RasterConfig {
                    size: 256,
                    ..RasterConfig::default()
                },
                ..MapEngineConfig::default()
            },
            Self::HighQuality => MapEngineConfig {
                tile_cache: TileCacheConfig {
                    capacity: 512,
                    upload_queue_len: 128,
                    uploads_per_frame: 8,
                    ..TileCacheConfig::default()
                },
                view: ViewConfig {
                    max_zoom: 16,
                    ..ViewConfig::default()
                },
                ..MapEngineConfig::default()
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MapEngineConfig {
    pub tile_cache: TileCacheConfig,
    pub view: ViewConfig,
    pub frame: FrameTimingConfig,
    pub raster: RasterConfig,
    pub position: PositionConfig,
}

impl MapEngineConfig {
    /// Parses and validates a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let cache = &self.tile_cache;
        if cache.capacity == 0 {
            return Err(MapError::Config("tile_cache.capacity must be positive".into()));
        }
        if cache.upload_queue_len == 0 {
            return Err(MapError::Config("tile_cache.upload_queue_len must be positive".into()));
        }

        let view = &self.view;
        if view.min_zoom > view.max_zoom {
            return Err(MapError::Config(format!(
                "view.min_zoom {} exceeds view.max_zoom {}",
                view.min_zoom, view.max_zoom
            )));
        }
        if view.max_zoom > 24 {
            return Err(MapError::Config("view.max_zoom must not exceed 24".into()));
        }
        if !(0.0..1.0).contains(&view.fling_friction) {
            return Err(MapError::Config("view.fling_friction must lie in [0, 1)".into()));
        }
        if !view.tile_display_px.is_finite() || view.tile_display_px <= 0.0 {
            return Err(MapError::Config("view.tile_display_px must be positive".into()));
        }

        if self.raster.size == 0 {
            return Err(MapError::Config("raster.size must be positive".into()));
        }
        if self.position.sample_interval_ms == 0 {
            return Err(MapError::Config("position.sample_interval_ms must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    /// Resident textures kept before eviction
    pub capacity: usize,
    /// Decoded tiles that may wait for upload
    pub upload_queue_len: usize,
    /// Uploads performed by the renderer each frame
    pub uploads_per_frame: usize,
    /// Row convention of the tile store
    pub store_rows: RowConvention,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            upload_queue_len: DEFAULT_UPLOAD_QUEUE,
            uploads_per_frame: DEFAULT_UPLOADS_PER_FRAME,
            store_rows: RowConvention::Tms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub initial_zoom: u8,
    pub initial_center: LatLng,
    /// On-screen size of one tile in pixels
    pub tile_display_px: f64,
    pub fling_friction: f64,
    pub fling_stop_speed: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            initial_zoom: 10,
            initial_center: LatLng::default(),
            tile_display_px: TILE_DISPLAY_SIZE,
            fling_friction: FLING_FRICTION,
            fling_stop_speed: FLING_STOP_SPEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameTimingConfig {
    pub target_fps: Option<u32>,
    pub frame_budget_ms: u64,
}

impl FrameTimingConfig {
    pub fn target_frame_duration_ms(&self) -> Option<u64> {
        self.target_fps.filter(|fps| *fps > 0).map(|fps| 1000 / fps as u64)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }
}

impl Default for FrameTimingConfig {
    fn default() -> Self {
        Self {
            target_fps: Some(60),
            frame_budget_ms: FRAME_BUDGET_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Side of the square output buffer
    pub size: u32,
    /// RGBA fill used before any feature is drawn
    pub background: [u8; 4],
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            size: RASTER_SIZE,
            background: [242, 239, 233, 255],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub sample_interval_ms: u64,
    /// Radii of the range rings drawn around the ownship, in nautical miles
    pub range_rings_nm: Vec<f64>,
}

impl PositionConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: POSITION_SAMPLE_INTERVAL_MS,
            range_rings_nm: vec![5.0, 10.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MapEngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tile_cache.capacity, 256);
        assert_eq!(config.tile_cache.upload_queue_len, 64);
        assert_eq!(config.tile_cache.uploads_per_frame, 4);
    }

    #[test]
    fn test_profiles_validate() {
        for profile in [
            MapPerformanceProfile::Balanced,
            MapPerformanceProfile::LowMemory,
            MapPerformanceProfile::HighQuality,
        ] {
            assert!(profile.resolve().validate().is_ok(), "{profile:?}");
        }
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = MapEngineConfig::from_json_str(
            r#"{ "tile_cache": { "capacity": 32 }, "view": { "max_zoom": 12 } }"#,
        )
        .unwrap();
        assert_eq!(config.tile_cache.capacity, 32);
        assert_eq!(config.tile_cache.upload_queue_len, 64);
        assert_eq!(config.view.max_zoom, 12);
        assert_eq!(config.view.min_zoom, DEFAULT_MIN_ZOOM);
    }

    #[test]
    fn test_invalid_zoom_range_rejected() {
        let result = MapEngineConfig::from_json_str(r#"{ "view": { "min_zoom": 9, "max_zoom": 4 } }"#);
        assert!(matches!(result, Err(MapError::Config(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = MapEngineConfig::from_json_str(r#"{ "tile_cache": { "capacity": 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = MapPerformanceProfile::HighQuality.resolve();
        let json = config.to_json_string().unwrap();
        assert_eq!(MapEngineConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_frame_duration() {
        let timing = FrameTimingConfig::default();
        assert_eq!(timing.target_frame_duration_ms(), Some(16));
        assert_eq!(timing.budget(), Duration::from_millis(16));
    }
}
