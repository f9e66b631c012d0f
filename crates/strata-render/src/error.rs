use strata_chunk::RegionUnavailable;
use thiserror::Error;

use crate::tile::TileCoord;

#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// A region the tile reads could not be opened. Retryable.
    #[error(transparent)]
    RegionUnavailable(#[from] RegionUnavailable),
    #[error("rendering tile {tile} failed: {reason}")]
    Failure { tile: TileCoord, reason: String },
}

impl RenderError {
    pub(crate) fn failure(tile: TileCoord, reason: impl Into<String>) -> Self {
        RenderError::Failure {
            tile,
            reason: reason.into(),
        }
    }
}
