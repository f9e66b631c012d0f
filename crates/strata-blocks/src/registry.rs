use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::{BiomeDef, BlockDef, ColorDef, PaletteConfig};
use crate::types::{BiomeId, Block, BlockId, BlockState, RenderKind, TRACKED_PROPERTIES, Tint};

/// Highest palette table version this build understands.
pub const PALETTE_FORMAT_VERSION: u32 = 1;

const AIR_NAME: &str = "minecraft:air";
const DEFAULT_UNKNOWN: &str = "strata:unknown";
const DEFAULT_PALETTE: &str = include_str!("../palette/default.toml");

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read palette {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse palette: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("palette format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("palette defines {0} more than once")]
    Duplicate(String),
    #[error("invalid color for {0}")]
    InvalidColor(String),
    #[error("palette has more than {} entries", u16::MAX)]
    TooLarge,
}

#[derive(Clone, Debug)]
pub struct BlockType {
    pub id: BlockId,
    pub name: String,
    pub color: [u8; 4],
    pub kind: RenderKind,
    pub occluding: bool,
    pub tint: Tint,
    pub emission: u8,
}

impl BlockType {
    #[inline]
    pub fn is_drawn(&self) -> bool {
        self.kind.is_drawn()
    }

    #[inline]
    pub fn is_solid(&self) -> bool {
        matches!(self.kind, RenderKind::Solid)
    }

    /// Whether a face of `self` is hidden by `neighbor` sitting against it.
    #[inline]
    pub fn face_hidden_by(&self, neighbor: &BlockType) -> bool {
        match neighbor.kind {
            RenderKind::Solid => true,
            RenderKind::Translucent | RenderKind::Liquid => neighbor.id == self.id,
            RenderKind::Cutout | RenderKind::Invisible => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BiomeType {
    pub id: BiomeId,
    pub name: String,
    pub grass: [u8; 4],
    pub foliage: [u8; 4],
    pub water: [u8; 4],
}

impl BiomeType {
    #[inline]
    pub fn tint(&self, tint: Tint) -> Option<[u8; 4]> {
        match tint {
            Tint::None => None,
            Tint::Grass => Some(self.grass),
            Tint::Foliage => Some(self.foliage),
            Tint::Water => Some(self.water),
        }
    }
}

/// Immutable name → id mapping for block states and biomes, built once at
/// startup. Id 0 is always air.
#[derive(Clone, Debug)]
pub struct BlockRegistry {
    pub format_version: u32,
    pub blocks: Vec<BlockType>,
    pub biomes: Vec<BiomeType>,
    by_name: HashMap<String, BlockId>,
    biome_by_name: HashMap<String, BiomeId>,
    unknown_block: BlockId,
    default_biome: BiomeId,
}

impl BlockRegistry {
    /// Palette bundled with the crate.
    pub fn builtin() -> Self {
        Self::from_toml_str(DEFAULT_PALETTE).expect("bundled palette is valid")
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, RegistryError> {
        let cfg: PaletteConfig = toml::from_str(s)?;
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: PaletteConfig) -> Result<Self, RegistryError> {
        if cfg.format_version > PALETTE_FORMAT_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                found: cfg.format_version,
                supported: PALETTE_FORMAT_VERSION,
            });
        }
        let mut reg = BlockRegistry {
            format_version: cfg.format_version,
            blocks: Vec::with_capacity(cfg.blocks.len() + 2),
            biomes: Vec::with_capacity(cfg.biomes.len() + 1),
            by_name: HashMap::new(),
            biome_by_name: HashMap::new(),
            unknown_block: 0,
            default_biome: 0,
        };

        // Air first so the zeroed block is always air, whatever the table order.
        let air = cfg
            .blocks
            .iter()
            .find(|d| normalize_name(&d.name) == AIR_NAME)
            .cloned()
            .unwrap_or_else(|| BlockDef {
                name: AIR_NAME.into(),
                color: ColorDef::Components(vec![0, 0, 0, 0]),
                kind: Some(RenderKind::Invisible),
                occluding: Some(false),
                tint: None,
                emission: None,
            });
        reg.push_block(&air)?;
        for def in cfg.blocks.iter() {
            if normalize_name(&def.name) == AIR_NAME {
                continue;
            }
            reg.push_block(def)?;
        }

        let unknown_name = normalize_name(cfg.unknown_block.as_deref().unwrap_or(DEFAULT_UNKNOWN));
        reg.unknown_block = match reg.by_name.get(&unknown_name) {
            Some(id) => *id,
            None => reg.push_block(&BlockDef {
                name: unknown_name,
                color: ColorDef::Components(vec![128, 128, 128, 255]),
                kind: Some(RenderKind::Solid),
                occluding: Some(true),
                tint: None,
                emission: None,
            })?,
        };

        for def in cfg.biomes.iter() {
            reg.push_biome(def)?;
        }
        let default_biome = cfg
            .default_biome
            .as_deref()
            .map(normalize_name)
            .unwrap_or_else(|| "minecraft:plains".to_string());
        reg.default_biome = match reg.biome_by_name.get(&default_biome) {
            Some(id) => *id,
            None => reg.push_biome(&BiomeDef {
                name: default_biome,
                grass: ColorDef::Components(vec![145, 189, 89]),
                foliage: ColorDef::Components(vec![119, 171, 47]),
                water: ColorDef::Components(vec![63, 118, 228]),
            })?,
        };
        Ok(reg)
    }

    fn push_block(&mut self, def: &BlockDef) -> Result<BlockId, RegistryError> {
        let name = normalize_name(&def.name);
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let id = BlockId::try_from(self.blocks.len()).map_err(|_| RegistryError::TooLarge)?;
        let color = def
            .color
            .to_rgba8()
            .ok_or_else(|| RegistryError::InvalidColor(name.clone()))?;
        let kind = def.kind.unwrap_or_default();
        self.blocks.push(BlockType {
            id,
            name: name.clone(),
            color,
            kind,
            occluding: def.occluding.unwrap_or(matches!(kind, RenderKind::Solid)),
            tint: def.tint.unwrap_or_default(),
            emission: def.emission.unwrap_or(0).min(15),
        });
        self.by_name.insert(name, id);
        Ok(id)
    }

    fn push_biome(&mut self, def: &BiomeDef) -> Result<BiomeId, RegistryError> {
        let name = normalize_name(&def.name);
        if self.biome_by_name.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let id = BiomeId::try_from(self.biomes.len()).map_err(|_| RegistryError::TooLarge)?;
        let color = |c: &ColorDef| {
            c.to_rgba8()
                .ok_or_else(|| RegistryError::InvalidColor(name.clone()))
        };
        let biome = BiomeType {
            id,
            name: name.clone(),
            grass: color(&def.grass)?,
            foliage: color(&def.foliage)?,
            water: color(&def.water)?,
        };
        self.biomes.push(biome);
        self.biome_by_name.insert(name, id);
        Ok(id)
    }

    #[inline]
    pub fn get(&self, id: BlockId) -> Option<&BlockType> {
        self.blocks.get(id as usize)
    }

    /// Like `get`, but ids outside the table resolve to the unknown block.
    #[inline]
    pub fn block(&self, id: BlockId) -> &BlockType {
        self.blocks
            .get(id as usize)
            .unwrap_or(&self.blocks[self.unknown_block as usize])
    }

    #[inline]
    pub fn biome(&self, id: BiomeId) -> &BiomeType {
        self.biomes
            .get(id as usize)
            .unwrap_or(&self.biomes[self.default_biome as usize])
    }

    pub fn id_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    #[inline]
    pub fn unknown_block_id(&self) -> BlockId {
        self.unknown_block
    }

    #[inline]
    pub fn default_biome_id(&self) -> BiomeId {
        self.default_biome
    }

    /// Resolves a block-state name plus properties into a packed `Block`.
    /// The second value is false when the name was not in the table.
    pub fn resolve_block<'a, I>(&self, name: &str, properties: I) -> (Block, bool)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let (id, known) = match self.id_by_name(name) {
            Some(id) => (id, true),
            None => (self.unknown_block, false),
        };
        (Block::new(id, pack_state(properties)), known)
    }

    pub fn resolve_biome(&self, name: &str) -> (BiomeId, bool) {
        match self.biome_by_name.get(&normalize_name(name)) {
            Some(id) => (*id, true),
            None => (self.default_biome, false),
        }
    }
}

fn pack_state<'a, I>(properties: I) -> BlockState
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut state = 0;
    for (key, value) in properties {
        for (prop, on, flag) in TRACKED_PROPERTIES {
            if key == prop && value == on {
                state |= flag;
            }
        }
    }
    state
}

/// Adds the `minecraft:` namespace to bare names.
pub fn normalize_name(name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        format!("minecraft:{name}")
    }
}
