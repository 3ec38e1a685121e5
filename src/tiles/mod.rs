pub mod cache;
pub mod loader;
pub mod source;

pub use cache::{CacheStats, TileCache, TileState};
pub use loader::{DecodedTile, TileLoader};
pub use source::{DirectoryTileStore, MemoryTileStore, RowConvention, TileStore};
