//! Durable tile storage keyed by `TileCoord`.
#![forbid(unsafe_code)]

pub mod file;
pub mod header;
pub mod memory;

use std::io;
use std::path::PathBuf;

use strata_render::{TileCoord, TilePayload};
use thiserror::Error;

pub use file::FileTileStorage;
pub use header::TileMeta;
pub use memory::MemoryTileStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The previous tile, if any, is still in place.
    #[error("writing tile {tile} to {}: {source}", .path.display())]
    Write {
        tile: TileCoord,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading tile {tile} from {}: {source}", .path.display())]
    Read {
        tile: TileCoord,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("tile {tile} is corrupt: {reason}")]
    Corrupt { tile: TileCoord, reason: String },
}

impl StorageError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StorageError::Corrupt { .. })
    }
}

/// Where rendered tiles live. A `put` is atomic with respect to `get`:
/// readers see either the previous tile or the new one.
pub trait TileStorage: Send + Sync {
    fn metadata(&self, tile: TileCoord) -> Result<Option<TileMeta>, StorageError>;
    fn put(&self, tile: TileCoord, payload: &TilePayload, watermark: u64) -> Result<TileMeta, StorageError>;
    fn get(&self, tile: TileCoord) -> Result<Option<TilePayload>, StorageError>;
    /// Removing a missing tile is not an error.
    fn delete(&self, tile: TileCoord) -> Result<(), StorageError>;
}
