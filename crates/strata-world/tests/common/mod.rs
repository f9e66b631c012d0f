#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use fastnbt::{ByteArray, IntArray, LongArray};
use flate2::Compression as Level;
use flate2::write::{GzEncoder, ZlibEncoder};
use strata_chunk::RegionCoord;
use strata_world::nbt::{
    BlockEntityNbt, ChunkNbt, HeightmapsNbt, LegacySectionNbt, LevelNbt, PaletteEntryNbt,
    PalettedNbt, SectionNbt,
};
use strata_world::packed::{Packing, bits_for, pack};
use strata_world::region::{Compression, compress_lz4_blocks};

pub fn entry(name: &str) -> PaletteEntryNbt {
    PaletteEntryNbt {
        name: name.to_string(),
        properties: None,
    }
}

pub fn entry_with(name: &str, props: &[(&str, &str)]) -> PaletteEntryNbt {
    PaletteEntryNbt {
        name: name.to_string(),
        properties: Some(
            props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        ),
    }
}

/// Flattened-layout chunk: stone up to `surface - 2`, grass at `surface - 1`,
/// air above. Sections span `min_section..=top_section`.
pub fn terrain_chunk(surface: i32, min_section: i8, top_section: i8, biome: &str) -> ChunkNbt {
    let mut sections = Vec::new();
    for sy in min_section..=top_section {
        let base = sy as i32 * 16;
        let mut indices = vec![0u16; 4096];
        for ly in 0..16 {
            let y = base + ly;
            let v = if y < surface - 1 {
                1
            } else if y == surface - 1 {
                2
            } else {
                0
            };
            for i in 0..256 {
                indices[ly as usize * 256 + i] = v;
            }
        }
        sections.push(SectionNbt {
            y: sy,
            block_states: Some(PalettedNbt {
                palette: vec![entry("minecraft:air"), entry("minecraft:stone"), entry("minecraft:grass_block")],
                data: Some(LongArray::new(pack(&indices, 4, Packing::Padded))),
            }),
            biomes: Some(PalettedNbt {
                palette: vec![biome.to_string()],
                data: None,
            }),
            sky_light: None,
            block_light: None,
        });
    }
    ChunkNbt {
        data_version: 3700,
        status: Some("minecraft:full".into()),
        y_pos: Some(min_section as i32),
        sections,
        heightmaps: None,
        block_entities: vec![BlockEntityNbt {
            id: "minecraft:chest".into(),
            x: 1,
            y: surface,
            z: 2,
        }],
        level: None,
    }
}

/// Single section of `data_version` with a palette wide enough to need 5 bits.
pub fn wide_palette_section(y: i8, packing: Packing) -> (Vec<PaletteEntryNbt>, Vec<i64>, Vec<u16>) {
    let names = [
        "air", "stone", "granite", "diorite", "andesite", "dirt", "sand", "gravel", "clay",
        "bedrock", "cobblestone", "oak_log", "oak_planks", "glass", "bricks", "snow_block",
        "obsidian",
    ];
    let palette: Vec<PaletteEntryNbt> = names.iter().map(|n| entry(n)).collect();
    let indices: Vec<u16> = (0..4096u32).map(|i| ((i * 7 + y as u32) % 17) as u16).collect();
    let data = pack(&indices, bits_for(palette.len()).max(4), packing);
    (palette, data, indices)
}

pub fn legacy_chunk(surface_section_y: i8) -> ChunkNbt {
    let (palette, data, _) = wide_palette_section(surface_section_y, Packing::Spanning);
    let mut biomes = vec![1i32; 1024];
    // the top layer of cells (y 252..256) is desert
    for v in biomes.iter_mut().skip(63 * 16) {
        *v = 2;
    }
    ChunkNbt {
        data_version: 2230,
        level: Some(LevelNbt {
            status: Some("full".into()),
            sections: vec![
                LegacySectionNbt {
                    y: -1,
                    palette: None,
                    block_states: None,
                    sky_light: Some(ByteArray::new(vec![0x7Fi8; 2048])),
                    block_light: None,
                },
                LegacySectionNbt {
                    y: surface_section_y,
                    palette: Some(palette),
                    block_states: Some(LongArray::new(data)),
                    sky_light: Some(ByteArray::new(vec![0x0Fi8; 2048])),
                    block_light: Some(ByteArray::new(vec![0i8; 2048])),
                },
            ],
            heightmaps: Some(HeightmapsNbt { world_surface: None }),
            tile_entities: Vec::new(),
            biomes: Some(IntArray::new(biomes)),
        }),
        ..Default::default()
    }
}

pub fn compress(bytes: &[u8], compression: Compression) -> Vec<u8> {
    match compression {
        Compression::Gzip => {
            let mut enc = GzEncoder::new(Vec::new(), Level::default());
            enc.write_all(bytes).unwrap();
            enc.finish().unwrap()
        }
        Compression::Zlib => {
            let mut enc = ZlibEncoder::new(Vec::new(), Level::default());
            enc.write_all(bytes).unwrap();
            enc.finish().unwrap()
        }
        Compression::None => bytes.to_vec(),
        Compression::Lz4 => compress_lz4_blocks(bytes),
    }
}

/// A chunk record as written into a region file: length prefix, compression
/// byte, payload.
pub fn record(nbt: &ChunkNbt, compression: Compression) -> Vec<u8> {
    let raw = fastnbt::to_bytes(nbt).unwrap();
    let payload = compress(&raw, compression);
    raw_record(compression.to_byte(), &payload)
}

pub fn raw_record(compression_byte: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.extend_from_slice(&(payload.len() as u32 + 1).to_be_bytes());
    out.push(compression_byte);
    out.extend_from_slice(payload);
    out
}

/// Builds region files chunk by chunk.
#[derive(Default)]
pub struct RegionBuilder {
    records: Vec<(usize, Vec<u8>, u32)>,
    raw_locations: Vec<(usize, u32)>,
}

impl RegionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(mut self, lx: i32, lz: i32, nbt: &ChunkNbt, compression: Compression, ts: u32) -> Self {
        let index = ((lz & 31) * 32 + (lx & 31)) as usize;
        self.records.push((index, record(nbt, compression), ts));
        self
    }

    pub fn record(mut self, index: usize, bytes: Vec<u8>, ts: u32) -> Self {
        self.records.push((index, bytes, ts));
        self
    }

    /// Overrides a location entry after layout.
    pub fn location(mut self, index: usize, raw: u32) -> Self {
        self.raw_locations.push((index, raw));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut header = vec![0u8; 8192];
        let mut body = Vec::new();
        let mut sector = 2u32;
        for (index, bytes, ts) in &self.records {
            let sectors = bytes.len().div_ceil(4096).max(1) as u32;
            let loc = (sector << 8) | sectors;
            header[index * 4..index * 4 + 4].copy_from_slice(&loc.to_be_bytes());
            header[4096 + index * 4..4096 + index * 4 + 4].copy_from_slice(&ts.to_be_bytes());
            body.extend_from_slice(bytes);
            body.resize((sector + sectors - 2) as usize * 4096, 0);
            sector += sectors;
        }
        for (index, raw) in &self.raw_locations {
            header[index * 4..index * 4 + 4].copy_from_slice(&raw.to_be_bytes());
        }
        header.extend_from_slice(&body);
        header
    }

    pub fn write(&self, dir: &Path, region: RegionCoord) {
        fs::write(dir.join(region.file_name()), self.build()).unwrap();
    }
}
