//! Chunk coordinates and the decoded, immutable chunk model.
#![forbid(unsafe_code)]

pub mod coords;
pub mod section;

use std::sync::Arc;

use strata_blocks::{BiomeId, Block};
use thiserror::Error;

pub use coords::{CHUNK_WIDTH, ChunkCoord, REGION_CHUNKS, RegionCoord};
pub use section::{BiomeGrid, BlockGrid, ChunkDataError, Nibbles, SECTION_SIZE, Section};

const COLUMNS: usize = (CHUNK_WIDTH * CHUNK_WIDTH) as usize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockEntity {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A decoded chunk. Sections are contiguous from `min_section` upwards.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub coord: ChunkCoord,
    pub data_version: i32,
    min_section: i32,
    sections: Vec<Section>,
    // First air y above the top block of each column, ZX order.
    heights: Box<[i32; COLUMNS]>,
    block_entities: Vec<BlockEntity>,
}

impl Chunk {
    /// Sentinel for chunks that were never generated.
    pub fn empty(coord: ChunkCoord) -> Self {
        Chunk {
            coord,
            data_version: 0,
            min_section: 0,
            sections: Vec::new(),
            heights: Box::new([0; COLUMNS]),
            block_entities: Vec::new(),
        }
    }

    /// Builds a chunk from possibly sparse sections. Gaps are filled with air.
    /// `heights` are absolute surface heights; when `None` they are computed
    /// from blocks using `is_surface`.
    pub fn new(
        coord: ChunkCoord,
        data_version: i32,
        mut sections: Vec<Section>,
        heights: Option<[i32; COLUMNS]>,
        block_entities: Vec<BlockEntity>,
        default_biome: BiomeId,
        is_surface: impl Fn(Block) -> bool,
    ) -> Self {
        sections.sort_by_key(|s| s.y);
        sections.dedup_by_key(|s| s.y);
        let min_section = sections.first().map_or(0, |s| s.y);
        let mut dense = Vec::with_capacity(sections.len());
        for s in sections {
            while let Some(last) = dense.last().map(|l: &Section| l.y) {
                if last + 1 >= s.y {
                    break;
                }
                dense.push(Section::air(last + 1, default_biome));
            }
            dense.push(s);
        }
        let mut chunk = Chunk {
            coord,
            data_version,
            min_section,
            sections: dense,
            heights: Box::new([0; COLUMNS]),
            block_entities,
        };
        match heights {
            Some(h) => chunk.heights = Box::new(h),
            None => chunk.compute_heights(is_surface),
        }
        chunk
    }

    fn compute_heights(&mut self, is_surface: impl Fn(Block) -> bool) {
        let min_y = self.min_y();
        for z in 0..16 {
            for x in 0..16 {
                let mut h = min_y;
                'col: for s in self.sections.iter().rev() {
                    if s.blocks.is_all_air() {
                        continue;
                    }
                    for ly in (0..SECTION_SIZE).rev() {
                        if is_surface(s.blocks.get(x, ly, z)) {
                            h = s.y * 16 + ly as i32 + 1;
                            break 'col;
                        }
                    }
                }
                self.heights[z * 16 + x] = h;
            }
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    #[inline]
    pub fn min_y(&self) -> i32 {
        self.min_section * 16
    }

    /// Exclusive upper bound of stored blocks.
    #[inline]
    pub fn max_y(&self) -> i32 {
        (self.min_section + self.sections.len() as i32) * 16
    }

    #[inline]
    fn section(&self, y: i32) -> Option<&Section> {
        let i = y.div_euclid(16) - self.min_section;
        if i < 0 {
            return None;
        }
        self.sections.get(i as usize)
    }

    /// Block at chunk-local x/z (0..16) and absolute y. Air outside the
    /// stored range.
    #[inline]
    pub fn block(&self, x: usize, y: i32, z: usize) -> Block {
        match self.section(y) {
            Some(s) => s.blocks.get(x, y.rem_euclid(16) as usize, z),
            None => Block::AIR,
        }
    }

    /// Biome at chunk-local x/z and absolute y, clamped to the stored range.
    pub fn biome(&self, x: usize, y: i32, z: usize) -> Option<BiomeId> {
        if self.sections.is_empty() {
            return None;
        }
        let y = y.clamp(self.min_y(), self.max_y() - 1);
        self.section(y)
            .map(|s| s.biomes.get(x, y.rem_euclid(16) as usize, z))
    }

    /// `None` when the chunk stores no sky light for that position.
    pub fn sky_light(&self, x: usize, y: i32, z: usize) -> Option<u8> {
        let s = self.section(y)?;
        s.sky_light
            .as_ref()
            .map(|n| n.get(x, y.rem_euclid(16) as usize, z))
    }

    pub fn block_light(&self, x: usize, y: i32, z: usize) -> Option<u8> {
        let s = self.section(y)?;
        s.block_light
            .as_ref()
            .map(|n| n.get(x, y.rem_euclid(16) as usize, z))
    }

    /// Whether any section carries light data.
    pub fn has_light(&self) -> bool {
        self.sections.iter().any(|s| s.sky_light.is_some())
    }

    /// First air y above the top surface block of the column.
    #[inline]
    pub fn surface_height(&self, x: usize, z: usize) -> i32 {
        self.heights[z * 16 + x]
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn block_entities(&self) -> &[BlockEntity] {
        &self.block_entities
    }

    /// Rough decoded size, used for cache accounting.
    pub fn approx_bytes(&self) -> usize {
        std::mem::size_of::<Chunk>()
            + COLUMNS * 4
            + self.sections.iter().map(Section::approx_bytes).sum::<usize>()
            + self
                .block_entities
                .iter()
                .map(|e| std::mem::size_of::<BlockEntity>() + e.id.len())
                .sum::<usize>()
    }
}

/// Raised by a chunk source when a region cannot be read at all.
#[derive(Debug, Clone, Error)]
#[error("region {}.{} unavailable: {reason}", .region.x, .region.z)]
pub struct RegionUnavailable {
    pub region: RegionCoord,
    pub reason: String,
}

/// Where renderers get chunks from. Corrupt chunks are already degraded to
/// the empty sentinel by the time they come out of a source.
pub trait ChunkSource: Send + Sync {
    fn load(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, RegionUnavailable>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stone_floor(top: i32) -> Section {
        let mut indices = vec![0u16; 4096];
        for y in 0..=top as usize {
            for i in 0..256 {
                indices[y * 256 + i] = 1;
            }
        }
        Section {
            y: 0,
            blocks: BlockGrid::paletted(vec![Block::AIR, Block::new(1, 0)], indices).unwrap(),
            biomes: BiomeGrid::Single(3),
            sky_light: None,
            block_light: None,
        }
    }

    #[test]
    fn empty_sentinel() {
        let c = Chunk::empty(ChunkCoord::new(4, -2));
        assert!(c.is_empty());
        assert_eq!(c.block(0, 64, 0), Block::AIR);
        assert_eq!(c.biome(0, 64, 0), None);
    }

    #[test]
    fn gaps_are_filled_and_heights_computed() {
        let mut high = Section::air(3, 0);
        high.blocks = BlockGrid::Single(Block::new(1, 0));
        let c = Chunk::new(
            ChunkCoord::new(0, 0),
            3700,
            vec![high, stone_floor(4)],
            None,
            Vec::new(),
            0,
            |b| b != Block::AIR,
        );
        assert_eq!(c.sections().len(), 4);
        assert_eq!(c.min_y(), 0);
        assert_eq!(c.max_y(), 64);
        assert_eq!(c.surface_height(5, 5), 64);
        assert_eq!(c.block(0, 4, 0), Block::new(1, 0));
        assert_eq!(c.block(0, 5, 0), Block::AIR);
        assert_eq!(c.block(0, 20, 0), Block::AIR);
        assert_eq!(c.block(0, -1, 0), Block::AIR);
        assert_eq!(c.biome(0, 500, 0), Some(0));
        assert_eq!(c.biome(0, -500, 0), Some(3));
    }

    #[test]
    fn heights_from_floor() {
        let c = Chunk::new(
            ChunkCoord::new(0, 0),
            3700,
            vec![stone_floor(6)],
            None,
            Vec::new(),
            0,
            |b| b != Block::AIR,
        );
        assert_eq!(c.surface_height(15, 15), 7);
        assert!(!c.has_light());
        assert!(c.approx_bytes() > 4096);
    }
}
