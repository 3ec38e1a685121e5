use super::loader::{DecodedTile, TileLoader};
use super::source::TileStore;
use crate::core::config::MapEngineConfig;
use crate::core::geo::TileCoord;
use crate::prelude::HashSet;
use crate::rendering::context::{GpuContext, TextureHandle};
use crate::rendering::raster::Rasterizer;
use crate::runtime::{self, TileSpawner};
use crate::Result;
use crossbeam_channel::Receiver;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Lifecycle of one tile key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Absent,
    InFlight,
    Resident,
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub requests: u64,
    pub misses: u64,
    pub uploads: u64,
    pub evictions: u64,
    pub discarded: u64,
    pub upload_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    misses: AtomicU64,
    uploads: AtomicU64,
    evictions: AtomicU64,
    discarded: AtomicU64,
    upload_failures: AtomicU64,
}

/// State shared with background jobs
#[derive(Debug, Default)]
struct Shared {
    in_flight: Mutex<HashSet<TileCoord>>,
    counters: Counters,
}

impl Shared {
    fn clear_in_flight(&self, coord: &TileCoord) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(coord);
        }
    }

    fn is_in_flight(&self, coord: &TileCoord) -> bool {
        self.in_flight
            .lock()
            .map(|in_flight| in_flight.contains(coord))
            .unwrap_or(false)
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Bounded set of GPU-resident tile textures filled asynchronously.
///
/// `request_tile` schedules fetch and rasterization on the spawner; finished
/// rasters wait in a bounded queue until the render thread calls
/// `drain_uploads`, which turns them into textures and evicts the least
/// recently used entries beyond capacity. Every texture this cache creates is
/// destroyed by it, on eviction or in `release`.
pub struct TileCache {
    shared: Arc<Shared>,
    resident: Mutex<LruCache<TileCoord, TextureHandle>>,
    /// Every handle created and not yet destroyed
    issued: Mutex<HashSet<TextureHandle>>,
    loader: Arc<TileLoader>,
    uploads: Receiver<DecodedTile>,
    spawner: Arc<dyn TileSpawner>,
    min_zoom: u8,
    max_zoom: u8,
}

impl TileCache {
    /// Fails if `config` does not validate
    pub fn new(
        config: &MapEngineConfig,
        store: Arc<dyn TileStore>,
        spawner: Arc<dyn TileSpawner>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = &config.tile_cache;
        let rasterizer = Rasterizer::new(&config.raster);
        let (loader, uploads) =
            TileLoader::new(store, cache.store_rows, rasterizer, cache.upload_queue_len);
        let capacity = NonZeroUsize::new(cache.capacity).unwrap_or(NonZeroUsize::MIN);

        log::info!(
            "tile cache: capacity {}, upload queue {}, zoom {}..={}",
            capacity,
            cache.upload_queue_len,
            config.view.min_zoom,
            config.view.max_zoom
        );

        Ok(Self {
            shared: Arc::new(Shared::default()),
            resident: Mutex::new(LruCache::new(capacity)),
            issued: Mutex::new(HashSet::default()),
            loader: Arc::new(loader),
            uploads,
            spawner,
            min_zoom: config.view.min_zoom,
            max_zoom: config.view.max_zoom,
        })
    }

    /// Cache using [`runtime::default_spawner`]
    pub fn with_default_spawner(
        config: &MapEngineConfig,
        store: Arc<dyn TileStore>,
    ) -> Result<Self> {
        Self::new(config, store, runtime::default_spawner())
    }

    /// Schedules a tile unless it is already resident or in flight.
    ///
    /// Never blocks on I/O. Returns whether a fetch was scheduled.
    pub fn request_tile(&self, coord: TileCoord) -> bool {
        if !coord.is_within(self.min_zoom, self.max_zoom) {
            log::debug!("ignoring request for out-of-range tile {}", coord);
            return false;
        }

        {
            let Ok(resident) = self.resident.lock() else {
                return false;
            };
            if resident.contains(&coord) {
                return false;
            }
            let Ok(mut in_flight) = self.shared.in_flight.lock() else {
                return false;
            };
            if !in_flight.insert(coord) {
                return false;
            }
        }

        bump(&self.shared.counters.requests);
        log::debug!("tile {} absent -> in flight", coord);

        let loader = Arc::clone(&self.loader);
        let shared = Arc::clone(&self.shared);
        runtime::spawn_on(self.spawner.as_ref(), move || match loader.load(coord) {
            Some(tile) => {
                if !loader.deliver(tile) {
                    shared.clear_in_flight(&coord);
                }
            }
            None => {
                bump(&shared.counters.misses);
                shared.clear_in_flight(&coord);
                log::debug!("tile {} in flight -> absent (miss)", coord);
            }
        });
        true
    }

    /// Texture of a resident tile, marking it most recently used
    pub fn get_texture(&self, coord: TileCoord) -> Option<TextureHandle> {
        self.resident.lock().ok()?.get(&coord).copied()
    }

    /// Uploads up to `max_per_frame` queued tiles. Render thread only.
    ///
    /// Tiles that are no longer in flight are dropped without an upload.
    /// Returns the number of textures created.
    pub fn drain_uploads(&self, ctx: &mut dyn GpuContext, max_per_frame: usize) -> usize {
        let mut uploaded = 0;
        for _ in 0..max_per_frame {
            let Ok(tile) = self.uploads.try_recv() else {
                break;
            };
            if self.upload(ctx, tile) {
                uploaded += 1;
            }
        }
        uploaded
    }

    fn upload(&self, ctx: &mut dyn GpuContext, tile: DecodedTile) -> bool {
        let coord = tile.coord;
        if !self.shared.is_in_flight(&coord) {
            bump(&self.shared.counters.discarded);
            log::debug!("discarding stale upload for tile {}", coord);
            return false;
        }

        let size = tile.raster.size;
        let handle = match ctx.create_texture(size, size, &tile.raster.pixels) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("texture creation failed for tile {}: {}", coord, e);
                bump(&self.shared.counters.upload_failures);
                self.shared.clear_in_flight(&coord);
                return false;
            }
        };
        if let Ok(mut issued) = self.issued.lock() {
            issued.insert(handle);
        }

        let evicted = match self.resident.lock() {
            Ok(mut resident) => {
                let evicted = resident.push(coord, handle);
                // Cleared while the resident lock is held so requests never see neither state
                self.shared.clear_in_flight(&coord);
                evicted
            }
            Err(_) => {
                self.destroy(ctx, handle);
                self.shared.clear_in_flight(&coord);
                return false;
            }
        };

        if let Some((old_coord, old_handle)) = evicted {
            if old_handle != handle {
                self.destroy(ctx, old_handle);
                if old_coord != coord {
                    bump(&self.shared.counters.evictions);
                    log::debug!("tile {} resident -> absent (evicted)", old_coord);
                }
            }
        }

        bump(&self.shared.counters.uploads);
        log::debug!("tile {} in flight -> resident", coord);
        true
    }

    fn destroy(&self, ctx: &mut dyn GpuContext, handle: TextureHandle) {
        ctx.destroy_texture(handle);
        if let Ok(mut issued) = self.issued.lock() {
            issued.remove(&handle);
        }
    }

    /// Destroys every texture this cache owns and forgets all tiles.
    ///
    /// Results still being produced by workers are discarded when they arrive.
    pub fn release(&self, ctx: &mut dyn GpuContext) {
        let dropped = self.uploads.try_iter().count();

        if let Ok(mut resident) = self.resident.lock() {
            resident.clear();
            if let Ok(mut in_flight) = self.shared.in_flight.lock() {
                in_flight.clear();
            }
        }

        let handles: Vec<TextureHandle> = match self.issued.lock() {
            Ok(mut issued) => issued.drain().collect(),
            Err(_) => Vec::new(),
        };
        for handle in &handles {
            ctx.destroy_texture(*handle);
        }

        log::info!(
            "tile cache released: {} textures destroyed, {} queued uploads dropped",
            handles.len(),
            dropped
        );
    }

    pub fn state(&self, coord: TileCoord) -> TileState {
        if let Ok(resident) = self.resident.lock() {
            if resident.contains(&coord) {
                return TileState::Resident;
            }
        }
        if self.shared.is_in_flight(&coord) {
            TileState::InFlight
        } else {
            TileState::Absent
        }
    }

    pub fn resident_len(&self) -> usize {
        self.resident.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn in_flight_len(&self) -> usize {
        self.shared.in_flight.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Decoded tiles waiting for upload
    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    pub fn capacity(&self) -> usize {
        self.resident.lock().map(|r| r.cap().get()).unwrap_or(0)
    }

    /// Handles created and not yet destroyed
    pub fn owned_textures(&self) -> usize {
        self.issued.lock().map(|i| i.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.shared.counters;
        CacheStats {
            requests: c.requests.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            uploads: c.uploads.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            upload_failures: c.upload_failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("resident", &self.resident_len())
            .field("in_flight", &self.in_flight_len())
            .field("pending_uploads", &self.pending_uploads())
            .field("stats", &self.stats())
            .finish()
    }
}
