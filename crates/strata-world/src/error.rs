use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use strata_chunk::{ChunkCoord, RegionCoord};
use thiserror::Error;

/// Errors from reading the world store. Cloneable so one failed load can be
/// handed to every waiter on the same chunk.
#[derive(Debug, Clone, Error)]
pub enum WorldError {
    #[error("corrupt chunk ({}, {}): {reason}", .coord.x, .coord.z)]
    CorruptChunk { coord: ChunkCoord, reason: String },
    #[error("region {}.{} unavailable: {reason}", .region.x, .region.z)]
    RegionUnavailable { region: RegionCoord, reason: String },
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl WorldError {
    pub(crate) fn corrupt(coord: ChunkCoord, reason: impl Into<String>) -> Self {
        WorldError::CorruptChunk {
            coord,
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(region: RegionCoord, reason: impl fmt::Display) -> Self {
        WorldError::RegionUnavailable {
            region,
            reason: reason.to_string(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, WorldError::CorruptChunk { .. })
    }
}
