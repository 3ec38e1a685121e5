use super::source::{RowConvention, TileStore};
use crate::core::geo::TileCoord;
use crate::rendering::raster::{Rasterizer, TileRaster};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

/// A rasterized tile waiting for upload on the render thread
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTile {
    pub coord: TileCoord,
    pub raster: TileRaster,
}

/// Fetches and rasterizes tiles on background workers, handing results to the
/// render thread over a bounded channel.
pub struct TileLoader {
    store: Arc<dyn TileStore>,
    rows: RowConvention,
    rasterizer: Rasterizer,
    tx: Sender<DecodedTile>,
}

impl TileLoader {
    /// Creates a loader together with the receiving end of its upload queue
    pub fn new(
        store: Arc<dyn TileStore>,
        rows: RowConvention,
        rasterizer: Rasterizer,
        queue_len: usize,
    ) -> (Self, Receiver<DecodedTile>) {
        let (tx, rx) = crossbeam_channel::bounded(queue_len.max(1));
        let loader = Self {
            store,
            rows,
            rasterizer,
            tx,
        };
        (loader, rx)
    }

    /// Row index in the store's convention
    pub fn store_row(&self, coord: TileCoord) -> u32 {
        match self.rows {
            RowConvention::Xyz => coord.y,
            RowConvention::Tms => coord.flipped_row(),
        }
    }

    /// Reads and rasterizes one tile; `None` when the store has no payload for it
    pub fn load(&self, coord: TileCoord) -> Option<DecodedTile> {
        let row = self.store_row(coord);
        let Some(bytes) = self.store.get(coord.z, coord.x, row) else {
            log::debug!("tile {} not in store (row {})", coord, row);
            return None;
        };

        let raster = self.rasterizer.rasterize(&bytes);
        log::debug!("rasterized tile {} from {} bytes", coord, bytes.len());
        Some(DecodedTile { coord, raster })
    }

    /// Queues a decoded tile, blocking while the queue is full.
    /// Returns `false` if the receiving side is gone.
    pub fn deliver(&self, tile: DecodedTile) -> bool {
        let coord = tile.coord;
        if self.tx.send(tile).is_err() {
            log::debug!("upload queue closed, dropping tile {}", coord);
            return false;
        }
        true
    }
}
