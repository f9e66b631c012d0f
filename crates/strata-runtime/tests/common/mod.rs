#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossbeam_channel::Receiver;
use fastnbt::LongArray;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use strata_chunk::{ChunkCoord, RegionCoord};
use strata_render::TileCoord;
use strata_runtime::{RenderConfig, RenderContext, RenderEvent, Scheduler};
use strata_storage::MemoryTileStorage;
use strata_world::nbt::{ChunkNbt, PaletteEntryNbt, PalettedNbt, SectionNbt};
use strata_world::packed::{Packing, pack};
use tempfile::TempDir;

const ZLIB: u8 = 2;

fn entry(name: &str) -> PaletteEntryNbt {
    PaletteEntryNbt {
        name: name.to_string(),
        properties: None,
    }
}

/// One section at y 64..80: `block` up to and excluding `top`, air above.
pub fn flat_chunk(block: &str, top: i32) -> ChunkNbt {
    let mut indices = vec![0u16; 4096];
    for ly in 0..16 {
        if 64 + ly < top {
            for i in 0..256 {
                indices[ly as usize * 256 + i] = 1;
            }
        }
    }
    ChunkNbt {
        data_version: 3700,
        status: Some("minecraft:full".into()),
        y_pos: Some(4),
        sections: vec![SectionNbt {
            y: 4,
            block_states: Some(PalettedNbt {
                palette: vec![entry("minecraft:air"), entry(block)],
                data: Some(LongArray::new(pack(&indices, 4, Packing::Padded))),
            }),
            biomes: None,
            sky_light: None,
            block_light: None,
        }],
        ..Default::default()
    }
}

fn record(nbt: &ChunkNbt) -> Vec<u8> {
    let raw = fastnbt::to_bytes(nbt).unwrap();
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).unwrap();
    let payload = enc.finish().unwrap();
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.extend_from_slice(&(payload.len() as u32 + 1).to_be_bytes());
    out.push(ZLIB);
    out.extend_from_slice(&payload);
    out
}

/// A world directory whose region files are rewritten on `flush`.
pub struct TestWorld {
    pub dir: TempDir,
    regions: BTreeMap<RegionCoord, BTreeMap<usize, (Vec<u8>, u32)>>,
    writes: u64,
}

impl TestWorld {
    pub fn new() -> Self {
        TestWorld {
            dir: tempfile::tempdir().unwrap(),
            regions: BTreeMap::new(),
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn set_chunk(&mut self, coord: ChunkCoord, nbt: &ChunkNbt, ts: u32) {
        self.set_record(coord, record(nbt), ts);
    }

    /// Stores raw record bytes, e.g. a truncated one.
    pub fn set_record(&mut self, coord: ChunkCoord, bytes: Vec<u8>, ts: u32) {
        self.regions
            .entry(coord.region())
            .or_default()
            .insert(coord.local_index(), (bytes, ts));
    }

    /// Writes every region file.
    pub fn flush(&mut self) {
        let regions: Vec<RegionCoord> = self.regions.keys().copied().collect();
        for r in regions {
            self.flush_region(r);
        }
    }

    /// Writes one region file with a modification time later than any
    /// earlier write.
    pub fn flush_region(&mut self, region: RegionCoord) {
        let mut header = vec![0u8; 8192];
        let mut body = Vec::new();
        let mut sector = 2u32;
        for (index, (bytes, ts)) in &self.regions[&region] {
            let sectors = bytes.len().div_ceil(4096).max(1) as u32;
            let loc = (sector << 8) | sectors;
            header[index * 4..index * 4 + 4].copy_from_slice(&loc.to_be_bytes());
            header[4096 + index * 4..4096 + index * 4 + 4].copy_from_slice(&ts.to_be_bytes());
            body.extend_from_slice(bytes);
            body.resize((sector + sectors - 2) as usize * 4096, 0);
            sector += sectors;
        }
        header.extend_from_slice(&body);
        let path = self.path().join(region.file_name());
        fs::write(&path, header).unwrap();
        self.writes += 1;
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + self.writes);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }
}

pub fn config(world: &TestWorld) -> RenderConfig {
    RenderConfig {
        world_store_path: world.path().to_path_buf(),
        tile_storage_path: world.path().join("tiles"),
        worker_count: 2,
        retry_backoff_ms: 5,
        ..Default::default()
    }
}

pub fn scheduler(config: RenderConfig, storage: Arc<MemoryTileStorage>) -> Scheduler {
    let ctx = RenderContext::with_storage(config, storage).unwrap();
    Scheduler::new(Arc::new(ctx))
}

/// Drains what has been published so far.
pub fn drain(events: &Receiver<RenderEvent>) -> Vec<RenderEvent> {
    events.try_iter().collect()
}

pub fn queued(events: &[RenderEvent]) -> Vec<TileCoord> {
    events
        .iter()
        .filter_map(|e| match e {
            RenderEvent::Queued { tile, .. } => Some(*tile),
            _ => None,
        })
        .collect()
}

pub fn started(events: &[RenderEvent], which: TileCoord) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, RenderEvent::Started { tile, .. } if *tile == which))
        .count()
}

pub const WAIT: Option<Duration> = Some(Duration::from_secs(30));
