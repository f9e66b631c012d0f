//! Chunk NBT layouts and their conversion into [`Chunk`].
//!
//! Two layouts are understood: the flattened one written since 1.18 and the
//! older one wrapped in a `Level` compound. Fields not listed here are ignored.

use std::collections::HashMap;

use fastnbt::{ByteArray, IntArray, LongArray};
use serde::{Deserialize, Serialize};
use strata_blocks::{BiomeId, Block, BlockRegistry};
use strata_chunk::section::{BIOME_CELLS, SECTION_VOLUME};
use strata_chunk::{BiomeGrid, BlockEntity, BlockGrid, Chunk, ChunkCoord, Nibbles, Section};

use crate::packed::{Packing, bits_for, unpack, unpack_inferred};

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct ChunkNbt {
    #[serde(rename = "DataVersion", default)]
    pub data_version: i32,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "yPos", default, skip_serializing_if = "Option::is_none")]
    pub y_pos: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionNbt>,
    #[serde(rename = "Heightmaps", default, skip_serializing_if = "Option::is_none")]
    pub heightmaps: Option<HeightmapsNbt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_entities: Vec<BlockEntityNbt>,
    #[serde(rename = "Level", default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LevelNbt>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct SectionNbt {
    #[serde(rename = "Y")]
    pub y: i8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_states: Option<PalettedNbt<PaletteEntryNbt>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biomes: Option<PalettedNbt<String>>,
    #[serde(rename = "SkyLight", default, skip_serializing_if = "Option::is_none")]
    pub sky_light: Option<ByteArray>,
    #[serde(rename = "BlockLight", default, skip_serializing_if = "Option::is_none")]
    pub block_light: Option<ByteArray>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct PalettedNbt<T> {
    pub palette: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<LongArray>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PaletteEntryNbt {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Properties", default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct HeightmapsNbt {
    #[serde(rename = "WORLD_SURFACE", default, skip_serializing_if = "Option::is_none")]
    pub world_surface: Option<LongArray>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct BlockEntityNbt {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct LevelNbt {
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "Sections", default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<LegacySectionNbt>,
    #[serde(rename = "Heightmaps", default, skip_serializing_if = "Option::is_none")]
    pub heightmaps: Option<HeightmapsNbt>,
    #[serde(rename = "TileEntities", default, skip_serializing_if = "Vec::is_empty")]
    pub tile_entities: Vec<BlockEntityNbt>,
    #[serde(rename = "Biomes", default, skip_serializing_if = "Option::is_none")]
    pub biomes: Option<IntArray>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct LegacySectionNbt {
    #[serde(rename = "Y")]
    pub y: i8,
    #[serde(rename = "Palette", default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<PaletteEntryNbt>>,
    #[serde(rename = "BlockStates", default, skip_serializing_if = "Option::is_none")]
    pub block_states: Option<LongArray>,
    #[serde(rename = "SkyLight", default, skip_serializing_if = "Option::is_none")]
    pub sky_light: Option<ByteArray>,
    #[serde(rename = "BlockLight", default, skip_serializing_if = "Option::is_none")]
    pub block_light: Option<ByteArray>,
}

/// Statuses of chunks that finished generation. Anything else is treated as
/// not generated yet.
const GENERATED_STATUSES: [&str; 6] = [
    "full",
    "spawn",
    "heightmaps",
    "light",
    "postprocessed",
    "fullchunk",
];

pub fn is_generated(status: Option<&str>) -> bool {
    match status {
        None => true,
        Some(s) => {
            let s = s.strip_prefix("minecraft:").unwrap_or(s);
            GENERATED_STATUSES.contains(&s)
        }
    }
}

/// Numeric biome ids used before biomes were stored by name.
const LEGACY_BIOMES: [(i32, &str); 16] = [
    (0, "ocean"),
    (1, "plains"),
    (2, "desert"),
    (3, "mountains"),
    (4, "forest"),
    (5, "taiga"),
    (6, "swamp"),
    (7, "river"),
    (12, "snowy_tundra"),
    (16, "beach"),
    (21, "jungle"),
    (24, "deep_ocean"),
    (27, "birch_forest"),
    (29, "dark_forest"),
    (30, "snowy_taiga"),
    (35, "savanna"),
];

/// Per-decode counters surfaced to the reader.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub unknown_blocks: u32,
    pub unknown_biomes: u32,
}

struct Decoder<'a> {
    registry: &'a BlockRegistry,
    packing: Packing,
    report: DecodeReport,
}

impl Decoder<'_> {
    fn palette(&mut self, entries: &[PaletteEntryNbt]) -> Vec<Block> {
        entries
            .iter()
            .map(|e| {
                let props = e
                    .properties
                    .iter()
                    .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                let (block, known) = self.registry.resolve_block(&e.name, props);
                if !known {
                    self.report.unknown_blocks += 1;
                }
                block
            })
            .collect()
    }

    fn biome(&mut self, name: &str) -> BiomeId {
        let (id, known) = self.registry.resolve_biome(name);
        if !known {
            self.report.unknown_biomes += 1;
        }
        id
    }

    fn blocks(
        &mut self,
        palette: &[PaletteEntryNbt],
        data: Option<&LongArray>,
    ) -> Result<BlockGrid, String> {
        let palette = self.palette(palette);
        if palette.is_empty() {
            return Err("empty block palette".into());
        }
        let indices = match data {
            None if palette.len() == 1 => return Ok(BlockGrid::Single(palette[0])),
            None => return Err("block data missing for multi-entry palette".into()),
            Some(data) => {
                let bits = bits_for(palette.len()).max(4);
                unpack(data, bits, SECTION_VOLUME, self.packing)
                    .ok_or_else(|| format!("block data has {} longs", data.len()))?
            }
        };
        BlockGrid::paletted(palette, indices).map_err(|e| e.to_string())
    }

    fn biomes(&mut self, paletted: &PalettedNbt<String>) -> Result<BiomeGrid, String> {
        let palette: Vec<BiomeId> = paletted.palette.iter().map(|n| self.biome(n)).collect();
        match (&paletted.data, palette.len()) {
            (_, 0) => Err("empty biome palette".into()),
            (None, 1) => Ok(BiomeGrid::Single(palette[0])),
            (None, _) => Err("biome data missing for multi-entry palette".into()),
            (Some(data), len) => {
                let idx = unpack(data, bits_for(len), BIOME_CELLS, Packing::Padded)
                    .ok_or_else(|| format!("biome data has {} longs", data.len()))?;
                let cells = idx
                    .into_iter()
                    .map(|i| palette.get(i as usize).copied().ok_or("biome index out of range"))
                    .collect::<Result<Vec<_>, _>>()?;
                BiomeGrid::from_cells(cells).map_err(|e| e.to_string())
            }
        }
    }

    fn legacy_biomes(&mut self, raw: Option<&IntArray>, section_y: i32) -> BiomeGrid {
        let default = self.registry.default_biome_id();
        let Some(raw) = raw else {
            return BiomeGrid::Single(default);
        };
        let lookup = |dec: &mut Self, v: i32| match LEGACY_BIOMES.iter().find(|(id, _)| *id == v) {
            Some((_, name)) => dec.biome(name),
            None => {
                dec.report.unknown_biomes += 1;
                default
            }
        };
        let mut cells = Vec::with_capacity(BIOME_CELLS);
        match raw.len() {
            // 4x4x4 cells over 256 blocks of height
            1024 => {
                for cy in 0..4 {
                    let layer = (section_y * 4 + cy).clamp(0, 63) as usize;
                    for i in 0..16 {
                        cells.push(lookup(self, raw[layer * 16 + i]));
                    }
                }
            }
            // one biome per column
            256 => {
                for _cy in 0..4 {
                    for cz in 0..4 {
                        for cx in 0..4 {
                            cells.push(lookup(self, raw[cz * 4 * 16 + cx * 4]));
                        }
                    }
                }
            }
            _ => return BiomeGrid::Single(default),
        }
        BiomeGrid::from_cells(cells).unwrap_or(BiomeGrid::Single(default))
    }
}

fn light(raw: Option<&ByteArray>) -> Result<Option<Nibbles>, String> {
    match raw {
        None => Ok(None),
        Some(bytes) => {
            let bytes: Vec<u8> = bytes.iter().map(|b| *b as u8).collect();
            Nibbles::from_bytes(&bytes)
                .map(Some)
                .map_err(|e| format!("light: {e}"))
        }
    }
}

fn heights(raw: Option<&HeightmapsNbt>, min_y: i32, packing: Packing) -> Option<[i32; 256]> {
    let data = raw?.world_surface.as_ref()?;
    let values = unpack_inferred(data, 256, packing)?;
    let mut out = [0i32; 256];
    for (o, v) in out.iter_mut().zip(values) {
        *o = min_y + v as i32;
    }
    Some(out)
}

fn block_entities(raw: &[BlockEntityNbt]) -> Vec<BlockEntity> {
    raw.iter()
        .map(|e| BlockEntity {
            id: e.id.clone(),
            x: e.x,
            y: e.y,
            z: e.z,
        })
        .collect()
}

/// Converts a parsed chunk tree into the decoded model. Errors describe why
/// the data is inconsistent.
pub fn decode_chunk(
    coord: ChunkCoord,
    nbt: &ChunkNbt,
    registry: &BlockRegistry,
) -> Result<(Chunk, DecodeReport), String> {
    let mut dec = Decoder {
        registry,
        packing: Packing::for_data_version(nbt.data_version),
        report: DecodeReport::default(),
    };
    let default_biome = registry.default_biome_id();
    let surface = |b: Block| registry.block(b.id).is_drawn();

    if let Some(level) = &nbt.level {
        if !is_generated(level.status.as_deref()) {
            return Ok((Chunk::empty(coord), dec.report));
        }
        let mut sections = Vec::with_capacity(level.sections.len());
        for s in &level.sections {
            let y = s.y as i32;
            let blocks = match (&s.palette, &s.block_states) {
                (Some(p), data) => dec.blocks(p, data.as_ref())?,
                (None, _) => BlockGrid::Single(Block::AIR),
            };
            sections.push(Section {
                y,
                blocks,
                biomes: dec.legacy_biomes(level.biomes.as_ref(), y),
                sky_light: light(s.sky_light.as_ref())?,
                block_light: light(s.block_light.as_ref())?,
            });
        }
        if sections.is_empty() {
            return Ok((Chunk::empty(coord), dec.report));
        }
        let h = heights(level.heightmaps.as_ref(), 0, dec.packing);
        let chunk = Chunk::new(
            coord,
            nbt.data_version,
            sections,
            h,
            block_entities(&level.tile_entities),
            default_biome,
            surface,
        );
        return Ok((chunk, dec.report));
    }

    if !is_generated(nbt.status.as_deref()) || nbt.sections.is_empty() {
        return Ok((Chunk::empty(coord), dec.report));
    }
    let mut sections = Vec::with_capacity(nbt.sections.len());
    for s in &nbt.sections {
        let blocks = match &s.block_states {
            Some(bs) => dec.blocks(&bs.palette, bs.data.as_ref())?,
            None => BlockGrid::Single(Block::AIR),
        };
        let biomes = match &s.biomes {
            Some(b) => dec.biomes(b)?,
            None => BiomeGrid::Single(default_biome),
        };
        sections.push(Section {
            y: s.y as i32,
            blocks,
            biomes,
            sky_light: light(s.sky_light.as_ref())?,
            block_light: light(s.block_light.as_ref())?,
        });
    }
    let min_y = nbt
        .y_pos
        .map(|y| y * 16)
        .unwrap_or_else(|| nbt.sections.iter().map(|s| s.y as i32 * 16).min().unwrap_or(0));
    let h = heights(nbt.heightmaps.as_ref(), min_y, dec.packing);
    let chunk = Chunk::new(
        coord,
        nbt.data_version,
        sections,
        h,
        block_entities(&nbt.block_entities),
        default_biome,
        surface,
    );
    Ok((chunk, dec.report))
}
