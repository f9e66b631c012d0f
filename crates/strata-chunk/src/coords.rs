/// Chunks per region edge.
pub const REGION_CHUNKS: i32 = 32;
/// Blocks per chunk edge.
pub const CHUNK_WIDTH: i32 = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoord {
    pub x: i32,
    pub z: i32,
}

impl RegionCoord {
    #[inline]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// `r.<x>.<z>.mca`
    pub fn file_name(self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }

    /// Parses a region file name; anything other than `r.<x>.<z>.mca` is `None`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("r.")?.strip_suffix(".mca")?;
        let (x, z) = rest.split_once('.')?;
        Some(Self::new(x.parse().ok()?, z.parse().ok()?))
    }

    #[inline]
    pub fn first_chunk(self) -> ChunkCoord {
        ChunkCoord::new(self.x * REGION_CHUNKS, self.z * REGION_CHUNKS)
    }

    /// All 1024 chunk coordinates of the region in header order.
    pub fn chunks(self) -> impl Iterator<Item = ChunkCoord> {
        (0..(REGION_CHUNKS * REGION_CHUNKS) as usize).map(move |i| ChunkCoord::from_local(self, i))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    #[inline]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    #[inline]
    pub fn region(self) -> RegionCoord {
        RegionCoord::new(
            self.x.div_euclid(REGION_CHUNKS),
            self.z.div_euclid(REGION_CHUNKS),
        )
    }

    /// Index of this chunk in its region header.
    #[inline]
    pub fn local_index(self) -> usize {
        ((self.z & 31) * 32 + (self.x & 31)) as usize
    }

    #[inline]
    pub fn from_local(region: RegionCoord, index: usize) -> Self {
        let first = region.first_chunk();
        let i = index as i32;
        ChunkCoord::new(first.x + (i & 31), first.z + (i >> 5))
    }

    /// World block coordinates of the chunk's north-west corner.
    #[inline]
    pub fn block_origin(self) -> (i32, i32) {
        (self.x * CHUNK_WIDTH, self.z * CHUNK_WIDTH)
    }

    #[inline]
    pub fn containing(wx: i32, wz: i32) -> Self {
        ChunkCoord::new(wx.div_euclid(CHUNK_WIDTH), wz.div_euclid(CHUNK_WIDTH))
    }
}
