use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};
use strata_blocks::RegistryError;
use strata_render::{RenderSettings, TileGrid};
use strata_world::{CacheConfig, EvictionPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Palette(#[from] RegistryError),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    Lru,
    #[default]
    LruFrequency,
}

/// Process-wide settings, read once at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub world_store_path: PathBuf,
    pub tile_storage_path: PathBuf,
    pub worker_count: usize,
    pub rescan_interval_seconds: u64,
    pub cache_max_chunks: usize,
    pub cache_max_bytes: Option<usize>,
    pub cache_policy: CachePolicy,
    pub cache_frequency_window: usize,
    pub lod_levels: u8,
    pub lod_factor: u32,
    pub tile_chunks: u32,
    /// Retries after the first attempt before a tile is given up on.
    pub retry_limit: u32,
    pub retry_backoff_ms: u64,
    /// Bound on queued plus in-flight tasks.
    pub max_queue_depth: usize,
    pub compress_tiles: bool,
    pub watch_world: bool,
    pub palette_path: Option<PathBuf>,
    pub render: RenderSettings,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            world_store_path: PathBuf::from("world"),
            tile_storage_path: PathBuf::from("tiles"),
            worker_count: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            rescan_interval_seconds: 60,
            cache_max_chunks: 4096,
            cache_max_bytes: None,
            cache_policy: CachePolicy::LruFrequency,
            cache_frequency_window: 8,
            lod_levels: 3,
            lod_factor: 2,
            tile_chunks: 2,
            retry_limit: 3,
            retry_backoff_ms: 250,
            max_queue_depth: 1024,
            compress_tiles: true,
            watch_world: false,
            palette_path: None,
            render: RenderSettings::default(),
        }
    }
}

impl RenderConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_toml_str(&s)?;
        log::info!(target: "scheduler", "loaded config from {}", path.display());
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: RenderConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.worker_count == 0 {
            return invalid("worker_count must be at least 1");
        }
        if self.lod_factor < 2 {
            return invalid("lod_factor must be at least 2");
        }
        if self.lod_levels == 0 {
            return invalid("lod_levels must be at least 1");
        }
        if self.tile_chunks == 0 {
            return invalid("tile_chunks must be at least 1");
        }
        if self.max_queue_depth == 0 {
            return invalid("max_queue_depth must be at least 1");
        }
        if self.cache_max_chunks == 0 {
            return invalid("cache_max_chunks must be at least 1");
        }
        if self.render.lowres_resolution == 0 {
            return invalid("render.lowres_resolution must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.render.ambient_light) {
            return invalid("render.ambient_light must lie in 0..=1");
        }
        // Tile x/z at the top level must not overflow block coordinates.
        let span = (self.tile_chunks as u64 * 16)
            .checked_mul((self.lod_factor as u64).saturating_pow(self.lod_levels as u32 - 1));
        if span.is_none_or(|s| s > i32::MAX as u64 / 2) {
            return invalid("tile pyramid is too tall for lod_factor and lod_levels");
        }
        Ok(())
    }

    pub fn tile_grid(&self) -> TileGrid {
        TileGrid::new(self.tile_chunks, self.lod_factor, self.lod_levels)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_chunks: self.cache_max_chunks,
            max_bytes: self.cache_max_bytes,
            policy: match self.cache_policy {
                CachePolicy::Lru => EvictionPolicy::Lru,
                CachePolicy::LruFrequency => EvictionPolicy::LruFrequency {
                    window: self.cache_frequency_window.max(1),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_render::DownsampleMode;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = RenderConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.rescan_interval_seconds, 60);
        assert_eq!(cfg.tile_grid(), TileGrid::default());
        assert_eq!(cfg.cache_config().policy, EvictionPolicy::LruFrequency { window: 8 });
        assert!(cfg.worker_count >= 1);
    }

    #[test]
    fn reads_nested_render_table() {
        let cfg = RenderConfig::from_toml_str(
            r#"
            world_store_path = "/srv/world"
            worker_count = 2
            cache_policy = "lru"
            max_queue_depth = 100

            [render]
            render_caves = false
            downsample = "highest"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.world_store_path, PathBuf::from("/srv/world"));
        assert_eq!(cfg.cache_config().policy, EvictionPolicy::Lru);
        assert!(!cfg.render.render_caves);
        assert_eq!(cfg.render.downsample, DownsampleMode::Highest);
        assert_eq!(cfg.render.sea_level, 63);
    }

    #[test]
    fn rejects_bad_values() {
        for bad in [
            "worker_count = 0",
            "lod_factor = 1",
            "tile_chunks = 0",
            "max_queue_depth = 0",
            "lod_levels = 40",
        ] {
            assert!(
                matches!(RenderConfig::from_toml_str(bad), Err(ConfigError::Invalid(_))),
                "{bad}"
            );
        }
        assert!(matches!(
            RenderConfig::from_toml_str("worker_cuont = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
