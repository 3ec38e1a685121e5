use crate::prelude::HashMap;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

/// Row numbering used by a tile store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RowConvention {
    /// Row 0 at the north edge
    Xyz,
    /// Row 0 at the south edge, as in MBTiles archives
    #[default]
    Tms,
}

/// Read access to raw tile payloads.
///
/// Calls may be slow and are only made from background workers. `row` follows
/// the store's own [`RowConvention`]; `None` means the tile is not present.
pub trait TileStore: Send + Sync {
    fn get(&self, zoom: u8, column: u32, row: u32) -> Option<Vec<u8>>;
}

/// Tiles held in memory, keyed by `(zoom, column, row)`
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    tiles: RwLock<HashMap<(u8, u32, u32), Vec<u8>>>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, zoom: u8, column: u32, row: u32, bytes: Vec<u8>) {
        if let Ok(mut tiles) = self.tiles.write() {
            tiles.insert((zoom, column, row), bytes);
        }
    }

    pub fn remove(&self, zoom: u8, column: u32, row: u32) -> Option<Vec<u8>> {
        self.tiles.write().ok()?.remove(&(zoom, column, row))
    }

    pub fn len(&self) -> usize {
        self.tiles.read().map(|tiles| tiles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TileStore for MemoryTileStore {
    fn get(&self, zoom: u8, column: u32, row: u32) -> Option<Vec<u8>> {
        self.tiles.read().ok()?.get(&(zoom, column, row)).cloned()
    }
}

/// Tiles stored as `{root}/{zoom}/{column}/{row}.{extension}` files
#[derive(Debug, Clone)]
pub struct DirectoryTileStore {
    root: PathBuf,
    extension: String,
}

impl DirectoryTileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_extension(root, "pbf")
    }

    pub fn with_extension(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn tile_path(&self, zoom: u8, column: u32, row: u32) -> PathBuf {
        self.root
            .join(zoom.to_string())
            .join(column.to_string())
            .join(format!("{}.{}", row, self.extension))
    }
}

impl TileStore for DirectoryTileStore {
    fn get(&self, zoom: u8, column: u32, row: u32) -> Option<Vec<u8>> {
        let path = self.tile_path(zoom, column, row);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("failed to read tile {}: {}", path.display(), e);
                None
            }
        }
    }
}
