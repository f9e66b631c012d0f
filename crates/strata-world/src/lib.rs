//! Region-file world store reader and the shared chunk cache.
#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod nbt;
pub mod packed;
pub mod reader;
pub mod region;

pub use cache::{CacheConfig, ChunkCache, ChunkCacheStats, EvictionPolicy};
pub use error::WorldError;
pub use reader::{ChunkLoader, ReaderStats, WorldReader};
