#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strata_blocks::{Block, BlockRegistry};
use strata_chunk::section::idx;
use strata_chunk::{
    BiomeGrid, BlockGrid, Chunk, ChunkCoord, ChunkSource, Nibbles, RegionCoord, RegionUnavailable,
    Section,
};

/// In-memory chunk source. Unknown chunks come back as never-generated.
#[derive(Default)]
pub struct MapSource {
    pub chunks: HashMap<ChunkCoord, Arc<Chunk>>,
    pub unavailable: HashSet<RegionCoord>,
}

impl MapSource {
    pub fn insert(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.coord, Arc::new(chunk));
    }
}

impl ChunkSource for MapSource {
    fn load(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, RegionUnavailable> {
        if self.unavailable.contains(&coord.region()) {
            return Err(RegionUnavailable {
                region: coord.region(),
                reason: "test".into(),
            });
        }
        Ok(self
            .chunks
            .get(&coord)
            .cloned()
            .unwrap_or_else(|| Arc::new(Chunk::empty(coord))))
    }
}

pub fn block(reg: &BlockRegistry, name: &str) -> Block {
    Block::new(reg.id_by_name(name).unwrap(), 0)
}

/// Chunk spanning sections `0..sections` whose blocks come from `f(x, y, z)`
/// in chunk-local x/z. `sky` fills every section's sky light when given.
pub fn chunk_from_fn(
    reg: &BlockRegistry,
    coord: ChunkCoord,
    sections: i32,
    sky: Option<u8>,
    f: impl Fn(usize, i32, usize) -> Block,
) -> Chunk {
    let mut out = Vec::new();
    for sy in 0..sections {
        let mut palette: Vec<Block> = Vec::new();
        let mut indices = vec![0u16; 4096];
        for ly in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    let b = f(x, sy * 16 + ly as i32, z);
                    let i = match palette.iter().position(|p| *p == b) {
                        Some(i) => i,
                        None => {
                            palette.push(b);
                            palette.len() - 1
                        }
                    };
                    indices[idx(x, ly, z)] = i as u16;
                }
            }
        }
        out.push(Section {
            y: sy,
            blocks: BlockGrid::paletted(palette, indices).unwrap(),
            biomes: BiomeGrid::Single(reg.default_biome_id()),
            sky_light: sky.map(Nibbles::filled),
            block_light: sky.map(|_| Nibbles::filled(0)),
        });
    }
    Chunk::new(coord, 3700, out, None, Vec::new(), reg.default_biome_id(), |b| {
        reg.block(b.id).is_drawn()
    })
}

/// Solid `name` from y 0 up to (not including) `top`.
pub fn flat_chunk(reg: &BlockRegistry, coord: ChunkCoord, name: &str, top: i32) -> Chunk {
    let b = block(reg, name);
    chunk_from_fn(reg, coord, 5, None, move |_, y, _| if y < top { b } else { Block::AIR })
}

/// Flat world of `name` over chunks `min..=max` on both axes.
pub fn flat_world(reg: &BlockRegistry, min: i32, max: i32, name: &str, top: i32) -> MapSource {
    let mut src = MapSource::default();
    for z in min..=max {
        for x in min..=max {
            src.insert(flat_chunk(reg, ChunkCoord::new(x, z), name, top));
        }
    }
    src
}
