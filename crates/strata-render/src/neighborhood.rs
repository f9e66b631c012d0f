use std::sync::Arc;

use log::warn;
use strata_blocks::{BiomeId, Block};
use strata_chunk::{CHUNK_WIDTH, Chunk, ChunkCoord, ChunkSource, RegionUnavailable};

use crate::tile::Footprint;

/// Sky and block light of one position, `0..=15` each.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Light {
    pub sky: u8,
    pub block: u8,
}

impl Light {
    pub const OPEN: Light = Light { sky: 15, block: 0 };

    #[inline]
    pub fn max(self, other: Light) -> Light {
        Light {
            sky: self.sky.max(other.sky),
            block: self.block.max(other.block),
        }
    }

    #[inline]
    pub fn level(self) -> u8 {
        self.sky.max(self.block)
    }

    #[inline]
    pub fn packed(self) -> u8 {
        (self.sky.min(15) << 4) | self.block.min(15)
    }
}

/// The chunks under a tile footprint plus a one-chunk ring around it,
/// addressed in world block coordinates. Absent chunks read as air.
pub struct Neighborhood {
    origin: ChunkCoord,
    width: i32,
    chunks: Vec<Arc<Chunk>>,
}

impl Neighborhood {
    /// Loads the footprint and its halo. A halo chunk whose region cannot be
    /// read is treated as absent; only footprint failures are returned.
    pub fn load(source: &dyn ChunkSource, fp: Footprint) -> Result<Self, RegionUnavailable> {
        let min = ChunkCoord::containing(fp.min_x, fp.min_z);
        let max = ChunkCoord::containing(fp.max_x - 1, fp.max_z - 1);
        let origin = ChunkCoord::new(min.x - 1, min.z - 1);
        let width = max.x - min.x + 3;
        let mut chunks = Vec::with_capacity((width * width) as usize);
        for dz in 0..width {
            for dx in 0..width {
                let coord = ChunkCoord::new(origin.x + dx, origin.z + dz);
                let halo = dx == 0 || dz == 0 || dx == width - 1 || dz == width - 1;
                let chunk = match source.load(coord) {
                    Ok(chunk) => chunk,
                    Err(e) if halo => {
                        warn!(target: "render", "halo chunk ({}, {}) unreadable, treating as absent: {e}", coord.x, coord.z);
                        Arc::new(Chunk::empty(coord))
                    }
                    Err(e) => return Err(e),
                };
                chunks.push(chunk);
            }
        }
        Ok(Neighborhood {
            origin,
            width,
            chunks,
        })
    }

    /// Chunk holding column `(wx, wz)`, with the column's local coordinates.
    #[inline]
    pub fn column(&self, wx: i32, wz: i32) -> Option<(&Chunk, usize, usize)> {
        let c = ChunkCoord::containing(wx, wz);
        let dx = c.x - self.origin.x;
        let dz = c.z - self.origin.z;
        if dx < 0 || dz < 0 || dx >= self.width || dz >= self.width {
            return None;
        }
        let chunk = &self.chunks[(dz * self.width + dx) as usize];
        Some((
            chunk,
            wx.rem_euclid(CHUNK_WIDTH) as usize,
            wz.rem_euclid(CHUNK_WIDTH) as usize,
        ))
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Arc<Chunk>> {
        let dx = coord.x - self.origin.x;
        let dz = coord.z - self.origin.z;
        if dx < 0 || dz < 0 || dx >= self.width || dz >= self.width {
            return None;
        }
        self.chunks.get((dz * self.width + dx) as usize)
    }

    #[inline]
    pub fn block(&self, wx: i32, y: i32, wz: i32) -> Block {
        match self.column(wx, wz) {
            Some((c, x, z)) => c.block(x, y, z),
            None => Block::AIR,
        }
    }

    /// Whether `y` lies under the bottom of the stored world at this column.
    #[inline]
    pub fn below_floor(&self, wx: i32, y: i32, wz: i32) -> bool {
        match self.column(wx, wz) {
            Some((c, _, _)) if !c.is_empty() => y < c.min_y(),
            _ => false,
        }
    }

    /// Light at a position. Chunks without light data get full sky light at
    /// or above the surface and darkness below it.
    pub fn light(&self, wx: i32, y: i32, wz: i32) -> Light {
        let Some((c, x, z)) = self.column(wx, wz) else {
            return Light::OPEN;
        };
        if c.is_empty() || y >= c.max_y() {
            return Light::OPEN;
        }
        let surface = c.surface_height(x, z);
        let sky = c
            .sky_light(x, y, z)
            .unwrap_or(if y >= surface { 15 } else { 0 });
        let block = c.block_light(x, y, z).unwrap_or(0);
        Light { sky, block }
    }

    #[inline]
    pub fn surface(&self, wx: i32, wz: i32) -> i32 {
        match self.column(wx, wz) {
            Some((c, x, z)) => c.surface_height(x, z),
            None => i32::MIN,
        }
    }

    #[inline]
    pub fn biome(&self, wx: i32, y: i32, wz: i32) -> Option<BiomeId> {
        self.column(wx, wz).and_then(|(c, x, z)| c.biome(x, y, z))
    }

    /// Whether any chunk inside `fp` (the halo excluded) holds data.
    pub fn any_present(&self, fp: Footprint) -> bool {
        fp.chunks()
            .filter_map(|c| self.chunk(c))
            .any(|c| !c.is_empty())
    }
}
