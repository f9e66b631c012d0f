//! What the rescan loop last saw of the world: per-region modification
//! times and per-chunk header timestamps.

use std::time::SystemTime;

use hashbrown::HashMap;
use strata_chunk::{CHUNK_WIDTH, ChunkCoord, REGION_CHUNKS, RegionCoord};
use strata_render::Footprint;

#[derive(Default)]
pub(crate) struct WorldMarks {
    regions: HashMap<RegionCoord, SystemTime>,
    chunks: HashMap<RegionCoord, HashMap<ChunkCoord, u32>>,
}

/// Chunks whose header entry differs from the previous pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ChunkDelta {
    pub changed: Vec<ChunkCoord>,
    pub removed: Vec<ChunkCoord>,
}

impl ChunkDelta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

impl WorldMarks {
    /// True when `mtime` matches the recorded time, meaning the region can be
    /// skipped.
    pub fn region_unchanged(&self, region: RegionCoord, mtime: SystemTime) -> bool {
        self.regions.get(&region) == Some(&mtime)
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionCoord> + '_ {
        self.regions.keys().copied()
    }

    /// Replaces the region's chunk timestamps and reports what moved.
    pub fn apply(
        &mut self,
        region: RegionCoord,
        mtime: Option<SystemTime>,
        stamps: &[(ChunkCoord, u32)],
    ) -> ChunkDelta {
        let next: HashMap<ChunkCoord, u32> = stamps.iter().copied().collect();
        let prev = self.chunks.remove(&region).unwrap_or_default();
        let mut delta = ChunkDelta::default();
        for (coord, ts) in stamps {
            if prev.get(coord) != Some(ts) {
                delta.changed.push(*coord);
            }
        }
        delta.removed = prev.keys().filter(|c| !next.contains_key(*c)).copied().collect();
        delta.changed.sort();
        delta.removed.sort();
        match mtime {
            Some(t) => {
                self.regions.insert(region, t);
                self.chunks.insert(region, next);
            }
            None => {
                self.regions.remove(&region);
            }
        }
        delta
    }

    /// Makes the next pass treat every chunk of `region` as new.
    pub fn forget(&mut self, region: RegionCoord) {
        self.regions.remove(&region);
        self.chunks.remove(&region);
    }

    #[inline]
    pub fn timestamp(&self, coord: ChunkCoord) -> Option<u32> {
        self.chunks.get(&coord.region())?.get(&coord).copied()
    }

    /// Newest chunk timestamp inside `fp`; 0 when no chunk is known.
    pub fn watermark(&self, fp: Footprint) -> u64 {
        fp.chunks()
            .filter_map(|c| self.timestamp(c))
            .map(u64::from)
            .max()
            .unwrap_or(0)
    }
}

/// Regions overlapping `fp`.
pub(crate) fn footprint_regions(fp: Footprint) -> Vec<RegionCoord> {
    let span = CHUNK_WIDTH * REGION_CHUNKS;
    let (x0, x1) = (fp.min_x.div_euclid(span), (fp.max_x - 1).div_euclid(span));
    let (z0, z1) = (fp.min_z.div_euclid(span), (fp.max_z - 1).div_euclid(span));
    let mut out = Vec::new();
    for z in z0..=z1 {
        for x in x0..=x1 {
            out.push(RegionCoord::new(x, z));
        }
    }
    out
}
