//! Block and biome palette registry.
#![forbid(unsafe_code)]

pub mod config;
pub mod registry;
pub mod types;

pub use registry::{BiomeType, BlockRegistry, BlockType, RegistryError, PALETTE_FORMAT_VERSION};
pub use types::{BiomeId, Block, BlockId, BlockState, RenderKind, Tint};
