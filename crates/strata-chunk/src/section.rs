use strata_blocks::{BiomeId, Block};
use thiserror::Error;

pub const SECTION_SIZE: usize = 16;
pub const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;
pub const BIOME_CELLS: usize = 64;

/// Shape problems found while assembling section data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkDataError {
    #[error("palette index {index} out of range for palette of {len}")]
    PaletteIndex { index: usize, len: usize },
    #[error("expected {expected} entries, found {found}")]
    Length { expected: usize, found: usize },
    #[error("empty palette")]
    EmptyPalette,
}

/// Index into a 16³ section, YZX order.
#[inline]
pub fn idx(x: usize, y: usize, z: usize) -> usize {
    (y * SECTION_SIZE + z) * SECTION_SIZE + x
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlockGrid {
    Single(Block),
    Paletted {
        palette: Vec<Block>,
        indices: Box<[u16]>,
    },
}

impl BlockGrid {
    pub fn paletted(palette: Vec<Block>, indices: Vec<u16>) -> Result<Self, ChunkDataError> {
        if palette.is_empty() {
            return Err(ChunkDataError::EmptyPalette);
        }
        if indices.len() != SECTION_VOLUME {
            return Err(ChunkDataError::Length {
                expected: SECTION_VOLUME,
                found: indices.len(),
            });
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= palette.len()) {
            return Err(ChunkDataError::PaletteIndex {
                index: bad as usize,
                len: palette.len(),
            });
        }
        if palette.len() == 1 {
            return Ok(BlockGrid::Single(palette[0]));
        }
        Ok(BlockGrid::Paletted {
            palette,
            indices: indices.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Block {
        match self {
            BlockGrid::Single(b) => *b,
            BlockGrid::Paletted { palette, indices } => palette[indices[idx(x, y, z)] as usize],
        }
    }

    pub fn is_all_air(&self) -> bool {
        match self {
            BlockGrid::Single(b) => *b == Block::AIR,
            BlockGrid::Paletted { palette, .. } => palette.iter().all(|b| *b == Block::AIR),
        }
    }

    fn approx_bytes(&self) -> usize {
        match self {
            BlockGrid::Single(_) => 0,
            BlockGrid::Paletted { palette, indices } => {
                palette.len() * std::mem::size_of::<Block>() + indices.len() * 2
            }
        }
    }
}

/// 4×4×4 biome cells per section.
#[derive(Clone, Debug, PartialEq)]
pub enum BiomeGrid {
    Single(BiomeId),
    Cells(Box<[BiomeId; BIOME_CELLS]>),
}

impl BiomeGrid {
    pub fn from_cells(cells: Vec<BiomeId>) -> Result<Self, ChunkDataError> {
        let found = cells.len();
        let cells: Box<[BiomeId; BIOME_CELLS]> = cells
            .into_boxed_slice()
            .try_into()
            .map_err(|_| ChunkDataError::Length {
                expected: BIOME_CELLS,
                found,
            })?;
        if cells.iter().all(|b| *b == cells[0]) {
            return Ok(BiomeGrid::Single(cells[0]));
        }
        Ok(BiomeGrid::Cells(cells))
    }

    /// Block-local coordinates, each 0..16.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> BiomeId {
        match self {
            BiomeGrid::Single(b) => *b,
            BiomeGrid::Cells(c) => c[((y >> 2) * 4 + (z >> 2)) * 4 + (x >> 2)],
        }
    }
}

/// 4-bit light values, two per byte, low nibble first.
#[derive(Clone, Debug, PartialEq)]
pub struct Nibbles(Box<[u8; SECTION_VOLUME / 2]>);

impl Nibbles {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChunkDataError> {
        let arr: [u8; SECTION_VOLUME / 2] = bytes.try_into().map_err(|_| ChunkDataError::Length {
            expected: SECTION_VOLUME / 2,
            found: bytes.len(),
        })?;
        Ok(Nibbles(Box::new(arr)))
    }

    pub fn filled(level: u8) -> Self {
        let v = level & 0x0F;
        Nibbles(Box::new([v | (v << 4); SECTION_VOLUME / 2]))
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        let i = idx(x, y, z);
        let byte = self.0[i >> 1];
        if i & 1 == 0 { byte & 0x0F } else { byte >> 4 }
    }
}

/// One 16³ slab of a chunk; `y` is the section index (block y / 16).
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub y: i32,
    pub blocks: BlockGrid,
    pub biomes: BiomeGrid,
    pub sky_light: Option<Nibbles>,
    pub block_light: Option<Nibbles>,
}

impl Section {
    pub fn air(y: i32, biome: BiomeId) -> Self {
        Section {
            y,
            blocks: BlockGrid::Single(Block::AIR),
            biomes: BiomeGrid::Single(biome),
            sky_light: None,
            block_light: None,
        }
    }

    pub(crate) fn approx_bytes(&self) -> usize {
        let light = |n: &Option<Nibbles>| n.as_ref().map_or(0, |_| SECTION_VOLUME / 2);
        let biomes = match self.biomes {
            BiomeGrid::Single(_) => 0,
            BiomeGrid::Cells(_) => BIOME_CELLS * 2,
        };
        std::mem::size_of::<Section>()
            + self.blocks.approx_bytes()
            + biomes
            + light(&self.sky_light)
            + light(&self.block_light)
    }
}
