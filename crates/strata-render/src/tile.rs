use strata_chunk::{CHUNK_WIDTH, ChunkCoord};

/// Position of a tile in the pyramid. `lod == 0` is the hires level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub x: i32,
    pub z: i32,
    pub lod: u8,
}

impl TileCoord {
    #[inline]
    pub const fn new(x: i32, z: i32, lod: u8) -> Self {
        Self { x, z, lod }
    }

    #[inline]
    pub const fn hires(x: i32, z: i32) -> Self {
        Self { x, z, lod: 0 }
    }

    #[inline]
    pub fn is_hires(self) -> bool {
        self.lod == 0
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.lod, self.x, self.z)
    }
}

/// Half-open rectangle of world block columns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Footprint {
    pub min_x: i32,
    pub min_z: i32,
    pub max_x: i32,
    pub max_z: i32,
}

impl Footprint {
    #[inline]
    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn contains(&self, x: i32, z: i32) -> bool {
        x >= self.min_x && x < self.max_x && z >= self.min_z && z < self.max_z
    }

    /// Chunks overlapping the footprint, row-major (z, x).
    pub fn chunks(&self) -> impl Iterator<Item = ChunkCoord> + use<> {
        let min = ChunkCoord::containing(self.min_x, self.min_z);
        let max = ChunkCoord::containing(self.max_x - 1, self.max_z - 1);
        (min.z..=max.z).flat_map(move |z| (min.x..=max.x).map(move |x| ChunkCoord::new(x, z)))
    }
}

/// Tile pyramid geometry: hires tile size and fan-out per level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileGrid {
    /// Chunks per hires tile edge.
    pub tile_chunks: u32,
    /// Children per lowres tile edge.
    pub lod_factor: u32,
    /// Number of levels including hires.
    pub lod_levels: u8,
}

impl Default for TileGrid {
    fn default() -> Self {
        TileGrid {
            tile_chunks: 2,
            lod_factor: 2,
            lod_levels: 3,
        }
    }
}

impl TileGrid {
    pub fn new(tile_chunks: u32, lod_factor: u32, lod_levels: u8) -> Self {
        TileGrid {
            tile_chunks,
            lod_factor,
            lod_levels,
        }
    }

    #[inline]
    pub fn max_lod(&self) -> u8 {
        self.lod_levels.saturating_sub(1)
    }

    /// Block width of a hires tile.
    #[inline]
    pub fn hires_width(&self) -> i32 {
        self.tile_chunks as i32 * CHUNK_WIDTH
    }

    /// Block width of a tile at `lod`.
    #[inline]
    pub fn span(&self, lod: u8) -> i32 {
        self.hires_width() * (self.lod_factor as i32).pow(lod as u32)
    }

    pub fn footprint(&self, tile: TileCoord) -> Footprint {
        let span = self.span(tile.lod);
        Footprint {
            min_x: tile.x * span,
            min_z: tile.z * span,
            max_x: (tile.x + 1) * span,
            max_z: (tile.z + 1) * span,
        }
    }

    /// `None` at the top level.
    pub fn parent(&self, tile: TileCoord) -> Option<TileCoord> {
        if tile.lod >= self.max_lod() {
            return None;
        }
        let n = self.lod_factor as i32;
        Some(TileCoord::new(
            tile.x.div_euclid(n),
            tile.z.div_euclid(n),
            tile.lod + 1,
        ))
    }

    /// Children in row-major (z, x) order; empty for hires tiles.
    pub fn children(&self, tile: TileCoord) -> Vec<TileCoord> {
        if tile.lod == 0 {
            return Vec::new();
        }
        let n = self.lod_factor as i32;
        let mut out = Vec::with_capacity((n * n) as usize);
        for dz in 0..n {
            for dx in 0..n {
                out.push(TileCoord::new(tile.x * n + dx, tile.z * n + dz, tile.lod - 1));
            }
        }
        out
    }

    /// Hires tile containing `chunk`.
    #[inline]
    pub fn hires_tile_of(&self, chunk: ChunkCoord) -> TileCoord {
        let n = self.tile_chunks as i32;
        TileCoord::hires(chunk.x.div_euclid(n), chunk.z.div_euclid(n))
    }

    /// Parent, grandparent, ... up to the top level.
    pub fn ancestors(&self, tile: TileCoord) -> impl Iterator<Item = TileCoord> + '_ {
        std::iter::successors(self.parent(tile), move |t| self.parent(*t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hires_tile_is_two_by_two_chunks() {
        let g = TileGrid::default();
        assert_eq!(g.span(0), 32);
        assert_eq!(g.span(2), 128);
        let fp = g.footprint(TileCoord::hires(-1, 0));
        assert_eq!((fp.min_x, fp.max_x, fp.min_z, fp.max_z), (-32, 0, 0, 32));
        let chunks: Vec<_> = fp.chunks().collect();
        assert_eq!(
            chunks,
            vec![
                ChunkCoord::new(-2, 0),
                ChunkCoord::new(-1, 0),
                ChunkCoord::new(-2, 1),
                ChunkCoord::new(-1, 1)
            ]
        );
    }

    #[test]
    fn parents_floor_and_stop_at_top() {
        let g = TileGrid::default();
        assert_eq!(g.parent(TileCoord::hires(-1, 3)), Some(TileCoord::new(-1, 1, 1)));
        assert_eq!(g.parent(TileCoord::new(5, 5, 2)), None);
        let up: Vec<_> = g.ancestors(TileCoord::hires(4, -4)).collect();
        assert_eq!(up, vec![TileCoord::new(2, -2, 1), TileCoord::new(1, -1, 2)]);
    }
}
