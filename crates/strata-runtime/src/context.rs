use std::sync::Arc;

use strata_blocks::BlockRegistry;
use strata_render::{TileGrid, TileRenderer};
use strata_storage::{FileTileStorage, TileStorage};
use strata_world::{ChunkCache, WorldReader};

use crate::config::{ConfigError, RenderConfig};

/// Everything a render pass needs, built once and shared by the scheduler's
/// threads.
pub struct RenderContext {
    pub config: RenderConfig,
    pub registry: Arc<BlockRegistry>,
    pub reader: Arc<WorldReader>,
    pub cache: Arc<ChunkCache>,
    pub renderer: TileRenderer,
    pub storage: Arc<dyn TileStorage>,
}

impl RenderContext {
    /// Opens the world and tile directories named by `config`.
    pub fn open(config: RenderConfig) -> Result<Self, ConfigError> {
        let storage = Arc::new(FileTileStorage::new(
            config.tile_storage_path.clone(),
            config.compress_tiles,
        ));
        Self::with_storage(config, storage)
    }

    pub fn with_storage(
        config: RenderConfig,
        storage: Arc<dyn TileStorage>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = Arc::new(match &config.palette_path {
            Some(path) => BlockRegistry::load_from_path(path)?,
            None => BlockRegistry::builtin(),
        });
        let reader = Arc::new(WorldReader::open(&config.world_store_path, registry.clone()));
        let cache = Arc::new(ChunkCache::new(reader.clone(), config.cache_config()));
        let renderer = TileRenderer::new(
            cache.clone(),
            registry.clone(),
            config.tile_grid(),
            config.render.clone(),
        );
        Ok(RenderContext {
            config,
            registry,
            reader,
            cache,
            renderer,
            storage,
        })
    }

    #[inline]
    pub fn grid(&self) -> &TileGrid {
        self.renderer.grid()
    }
}
