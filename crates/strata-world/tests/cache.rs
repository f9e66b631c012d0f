mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use common::*;
use strata_blocks::BlockRegistry;
use strata_chunk::{Chunk, ChunkCoord, ChunkSource, RegionCoord};
use strata_world::region::Compression;
use strata_world::{CacheConfig, ChunkCache, ChunkLoader, EvictionPolicy, WorldError, WorldReader};

struct SlowLoader {
    calls: AtomicUsize,
}

impl ChunkLoader for SlowLoader {
    fn read_chunk(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, WorldError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        if coord.x < 0 {
            return Err(WorldError::RegionUnavailable {
                region: coord.region(),
                reason: "gone".into(),
            });
        }
        Ok(Arc::new(Chunk::empty(coord)))
    }
}

#[test]
fn concurrent_misses_share_one_load() {
    let loader = Arc::new(SlowLoader {
        calls: AtomicUsize::new(0),
    });
    let cache = Arc::new(ChunkCache::new(loader.clone(), CacheConfig::default()));
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.get(ChunkCoord::new(4, 4)).unwrap()
            })
        })
        .collect();
    let chunks: Vec<Arc<Chunk>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    assert!(chunks.iter().all(|c| Arc::ptr_eq(c, &chunks[0])));
    let s = cache.stats();
    assert_eq!(s.misses, 1);
    assert_eq!(s.hits + s.coalesced, 7);
}

#[test]
fn waiters_share_the_error_too() {
    let loader = Arc::new(SlowLoader {
        calls: AtomicUsize::new(0),
    });
    let cache = Arc::new(ChunkCache::new(loader.clone(), CacheConfig::default()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || cache.get(ChunkCoord::new(-3, 0)))
        })
        .collect();
    for h in handles {
        let err = h.join().unwrap().unwrap_err();
        assert!(matches!(err, WorldError::RegionUnavailable { .. }));
    }
    // failures are not cached
    assert!(cache.get(ChunkCoord::new(-3, 0)).is_err());
    assert!(loader.calls.load(Ordering::SeqCst) >= 2);
}

/// First read blocks until released and sees version 1; later reads see 2.
struct ChangingLoader {
    calls: AtomicUsize,
    started: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl ChunkLoader for ChangingLoader {
    fn read_chunk(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, WorldError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut chunk = Chunk::empty(coord);
        chunk.data_version = if call == 0 { 1 } else { 2 };
        if call == 0 {
            self.started.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        Ok(Arc::new(chunk))
    }
}

#[test]
fn reads_after_invalidate_do_not_join_older_loads() {
    let (started_tx, started_rx) = channel();
    let (release_tx, release_rx) = channel();
    let loader = Arc::new(ChangingLoader {
        calls: AtomicUsize::new(0),
        started: Mutex::new(started_tx),
        release: Mutex::new(release_rx),
    });
    let cache = Arc::new(ChunkCache::new(loader.clone(), CacheConfig::default()));
    let coord = ChunkCoord::new(3, 3);

    let early = {
        let cache = cache.clone();
        thread::spawn(move || cache.get(coord).unwrap())
    };
    started_rx.recv().unwrap();
    cache.invalidate(coord.region());

    // returns while the older load is still blocked
    let fresh = cache.get(coord).unwrap();
    assert_eq!(fresh.data_version, 2);

    release_tx.send(()).unwrap();
    assert_eq!(early.join().unwrap().data_version, 1);
    assert_eq!(cache.get(coord).unwrap().data_version, 2);
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().coalesced, 0);
}

#[test]
fn corrupt_chunks_become_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let nbt = terrain_chunk(64, 0, 3, "minecraft:plains");
    RegionBuilder::new()
        .chunk(0, 0, &nbt, Compression::Zlib, 1)
        .record(1, raw_record(2, b"broken"), 1)
        .write(dir.path(), RegionCoord::new(0, 0));
    std::fs::write(dir.path().join("r.1.0.mca"), [0u8; 10]).unwrap();
    std::fs::create_dir(dir.path().join("r.2.0.mca")).unwrap();
    let reader = Arc::new(WorldReader::open(dir.path(), Arc::new(BlockRegistry::builtin())));
    let cache = ChunkCache::new(reader, CacheConfig::default());

    assert!(cache.get(ChunkCoord::new(1, 0)).unwrap_err().is_corrupt());
    assert!(cache.get_or_placeholder(ChunkCoord::new(1, 0)).unwrap().is_empty());
    assert!(!cache.load(ChunkCoord::new(0, 0)).unwrap().is_empty());
    // a region file cut inside its header only spoils its own chunks
    assert!(cache.get(ChunkCoord::new(32, 0)).unwrap_err().is_corrupt());
    assert!(cache.load(ChunkCoord::new(33, 0)).unwrap().is_empty());
    // region-level failures still surface through the source
    let err = cache.load(ChunkCoord::new(64, 0)).unwrap_err();
    assert_eq!(err.region, RegionCoord::new(2, 0));
}

#[test]
fn byte_budget_evicts_down_to_the_newest() {
    let dir = tempfile::tempdir().unwrap();
    let nbt = terrain_chunk(64, 0, 3, "minecraft:plains");
    let mut b = RegionBuilder::new();
    for x in 0..6 {
        b = b.chunk(x, 0, &nbt, Compression::Zlib, 1);
    }
    b.write(dir.path(), RegionCoord::new(0, 0));
    let reader = Arc::new(WorldReader::open(dir.path(), Arc::new(BlockRegistry::builtin())));
    let one = reader.read_chunk(ChunkCoord::new(0, 0)).unwrap().approx_bytes();
    let cache = ChunkCache::new(
        reader,
        CacheConfig {
            max_chunks: 100,
            max_bytes: Some(one * 3),
            policy: EvictionPolicy::LruFrequency { window: 4 },
        },
    );
    for x in 0..6 {
        cache.get(ChunkCoord::new(x, 0)).unwrap();
    }
    let s = cache.stats();
    assert_eq!(s.entries, 3);
    assert!(s.bytes <= one * 3);
    assert_eq!(s.evictions, 3);
    assert!(cache.contains(ChunkCoord::new(5, 0)));
}
