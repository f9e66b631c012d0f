//! Tile rendering: hires meshes and column maps from chunks, lowres column
//! maps from child tiles, and the binary payload they are stored as.
#![forbid(unsafe_code)]

pub mod columns;
pub mod error;
pub mod face;
pub mod hires;
pub mod mesh;
pub mod neighborhood;
pub mod payload;
pub mod renderer;
pub mod settings;
pub mod tile;

pub use columns::{ColumnMap, ColumnPixel};
pub use error::RenderError;
pub use mesh::TileMesh;
pub use payload::{FORMAT_VERSION, HiresTile, LowresTile, PayloadError, TilePayload, content_version};
pub use renderer::TileRenderer;
pub use settings::{DownsampleMode, RenderSettings};
pub use tile::{Footprint, TileCoord, TileGrid};
