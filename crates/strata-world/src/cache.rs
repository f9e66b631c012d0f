use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use strata_chunk::{Chunk, ChunkCoord, ChunkSource, RegionCoord, RegionUnavailable};

use crate::error::WorldError;
use crate::reader::ChunkLoader;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Strict least recently used.
    Lru,
    /// Among the `window` least recently used entries, evict the one with the
    /// fewest hits.
    LruFrequency { window: usize },
}

#[derive(Copy, Clone, Debug)]
pub struct CacheConfig {
    pub max_chunks: usize,
    pub max_bytes: Option<usize>,
    pub policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_chunks: 4096,
            max_bytes: None,
            policy: EvictionPolicy::LruFrequency { window: 8 },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub entries: usize,
    pub bytes: usize,
}

struct Entry {
    chunk: Arc<Chunk>,
    bytes: usize,
    tick: u64,
    freq: u32,
    // Aging epoch `freq` was last brought up to date at.
    epoch: u32,
}

impl Entry {
    #[inline]
    fn frequency(&self, epoch: u32) -> u32 {
        let shift = epoch.wrapping_sub(self.epoch).min(31);
        self.freq >> shift
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ChunkCoord, Entry>,
    recency: BTreeMap<u64, ChunkCoord>,
    generations: HashMap<RegionCoord, u64>,
    tick: u64,
    // Bumped on every eviction; halves every entry's frequency lazily.
    epoch: u32,
    bytes: usize,
}

impl CacheState {
    fn generation(&self, region: RegionCoord) -> u64 {
        self.generations.get(&region).copied().unwrap_or(0)
    }

    fn touch(&mut self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.tick += 1;
        let (tick, epoch) = (self.tick, self.epoch);
        let entry = self.entries.get_mut(&coord)?;
        self.recency.remove(&entry.tick);
        entry.freq = entry.frequency(epoch).saturating_add(1);
        entry.epoch = epoch;
        entry.tick = tick;
        self.recency.insert(tick, coord);
        Some(entry.chunk.clone())
    }

    fn remove(&mut self, coord: &ChunkCoord) -> bool {
        match self.entries.remove(coord) {
            Some(e) => {
                self.recency.remove(&e.tick);
                self.bytes -= e.bytes;
                true
            }
            None => false,
        }
    }

    /// Next entry to evict, never `keep`.
    fn victim(&self, policy: EvictionPolicy, keep: ChunkCoord) -> Option<ChunkCoord> {
        let mut candidates = self.recency.values().filter(|c| **c != keep);
        match policy {
            EvictionPolicy::Lru => candidates.next().copied(),
            EvictionPolicy::LruFrequency { window } => {
                let mut best: Option<(u32, ChunkCoord)> = None;
                for coord in candidates.take(window.max(1)) {
                    let freq = self.entries[coord].frequency(self.epoch);
                    if best.is_none_or(|(f, _)| freq < f) {
                        best = Some((freq, *coord));
                    }
                }
                best.map(|(_, c)| c)
            }
        }
    }
}

struct InFlight {
    // Region generation the load started under.
    generation: u64,
    result: Mutex<Option<Result<Arc<Chunk>, WorldError>>>,
    ready: Condvar,
}

impl InFlight {
    fn wait(&self) -> Result<Arc<Chunk>, WorldError> {
        let mut slot = self.result.lock().unwrap();
        loop {
            if let Some(r) = slot.as_ref() {
                return r.clone();
            }
            slot = self.ready.wait(slot).unwrap();
        }
    }

    fn publish(&self, result: Result<Arc<Chunk>, WorldError>) {
        *self.result.lock().unwrap() = Some(result);
        self.ready.notify_all();
    }
}

/// Removes the in-flight marker when the loading thread finishes, and hands
/// waiters an error if it unwound without publishing.
struct LoadGuard<'a> {
    cache: &'a ChunkCache,
    coord: ChunkCoord,
    slot: Arc<InFlight>,
    published: bool,
}

impl LoadGuard<'_> {
    fn finish(mut self, result: Result<Arc<Chunk>, WorldError>) -> Result<Arc<Chunk>, WorldError> {
        self.slot.publish(result.clone());
        self.published = true;
        result
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.slot.publish(Err(WorldError::unavailable(
                self.coord.region(),
                "chunk load aborted",
            )));
        }
        let mut inflight = self.cache.inflight.lock().unwrap();
        // A newer load may have replaced this slot after an invalidation.
        if inflight
            .get(&self.coord)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot))
        {
            inflight.remove(&self.coord);
        }
    }
}

/// Bounded read-through cache of decoded chunks.
///
/// Concurrent misses on the same coordinate share one load. Invalidating a
/// region drops its entries, keeps loads that started earlier from being
/// inserted afterwards, and stops later callers from joining them.
pub struct ChunkCache {
    loader: Arc<dyn ChunkLoader>,
    config: CacheConfig,
    state: Mutex<CacheState>,
    inflight: Mutex<HashMap<ChunkCoord, Arc<InFlight>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl ChunkCache {
    pub fn new(loader: Arc<dyn ChunkLoader>, config: CacheConfig) -> Self {
        Self {
            loader,
            config,
            state: Mutex::new(CacheState::default()),
            inflight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, WorldError> {
        if let Some(chunk) = self.state.lock().unwrap().touch(coord) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(chunk);
        }

        let (slot, generation) = {
            let mut inflight = self.inflight.lock().unwrap();
            let generation = {
                let mut st = self.state.lock().unwrap();
                // A load may have completed between the miss above and here.
                if let Some(chunk) = st.touch(coord) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(chunk);
                }
                st.generation(coord.region())
            };
            // Loads started before the last invalidation may return old
            // data; those are left to their own waiters.
            let current = inflight
                .get(&coord)
                .filter(|slot| slot.generation == generation)
                .cloned();
            if let Some(existing) = current {
                drop(inflight);
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                return existing.wait();
            }
            let slot = Arc::new(InFlight {
                generation,
                result: Mutex::new(None),
                ready: Condvar::new(),
            });
            inflight.insert(coord, slot.clone());
            (slot, generation)
        };
        self.misses.fetch_add(1, Ordering::Relaxed);

        let guard = LoadGuard {
            cache: self,
            coord,
            slot,
            published: false,
        };
        let result = self.loader.read_chunk(coord);
        if let Ok(chunk) = &result {
            self.insert(coord, chunk.clone(), generation);
        }
        guard.finish(result)
    }

    /// Like [`get`](Self::get), but corrupt chunks are replaced by the empty
    /// sentinel. Only region-level failures are returned.
    pub fn get_or_placeholder(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, WorldError> {
        match self.get(coord) {
            Err(WorldError::CorruptChunk { reason, .. }) => {
                log::warn!(
                    target: "cache",
                    "chunk ({}, {}) is corrupt, rendering as empty: {reason}",
                    coord.x,
                    coord.z
                );
                Ok(Arc::new(Chunk::empty(coord)))
            }
            other => other,
        }
    }

    fn insert(&self, coord: ChunkCoord, chunk: Arc<Chunk>, generation: u64) {
        let mut st = self.state.lock().unwrap();
        if st.generation(coord.region()) != generation {
            log::trace!(target: "cache", "dropping stale load of ({}, {})", coord.x, coord.z);
            return;
        }
        st.remove(&coord);
        st.tick += 1;
        let bytes = chunk.approx_bytes();
        let entry = Entry {
            chunk,
            bytes,
            tick: st.tick,
            freq: 1,
            epoch: st.epoch,
        };
        let tick = st.tick;
        st.recency.insert(tick, coord);
        st.entries.insert(coord, entry);
        st.bytes += bytes;

        let mut evicted = 0u64;
        while st.entries.len() > 1 && self.over_budget(&st) {
            let Some(victim) = st.victim(self.config.policy, coord) else {
                break;
            };
            st.remove(&victim);
            st.epoch = st.epoch.wrapping_add(1);
            evicted += 1;
        }
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    fn over_budget(&self, st: &CacheState) -> bool {
        st.entries.len() > self.config.max_chunks
            || self.config.max_bytes.is_some_and(|max| st.bytes > max)
    }

    /// Drops every cached chunk of `region`.
    pub fn invalidate(&self, region: RegionCoord) {
        let mut st = self.state.lock().unwrap();
        *st.generations.entry(region).or_insert(0) += 1;
        let doomed: Vec<ChunkCoord> = st
            .entries
            .keys()
            .filter(|c| c.region() == region)
            .copied()
            .collect();
        for c in &doomed {
            st.remove(c);
        }
        drop(st);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            target: "cache",
            "invalidated region {}.{} ({} chunks dropped)",
            region.x,
            region.z,
            doomed.len()
        );
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.state.lock().unwrap().entries.contains_key(&coord)
    }

    pub fn stats(&self) -> ChunkCacheStats {
        let (entries, bytes) = {
            let st = self.state.lock().unwrap();
            (st.entries.len(), st.bytes)
        };
        ChunkCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries,
            bytes,
        }
    }
}

impl ChunkSource for ChunkCache {
    fn load(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, RegionUnavailable> {
        self.get_or_placeholder(coord).map_err(|e| match e {
            WorldError::RegionUnavailable { region, reason } => RegionUnavailable { region, reason },
            other => RegionUnavailable {
                region: coord.region(),
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting(AtomicU64);

    impl ChunkLoader for Counting {
        fn read_chunk(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, WorldError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(Arc::new(Chunk::empty(coord)))
        }
    }

    fn cache(max: usize, policy: EvictionPolicy) -> (Arc<Counting>, ChunkCache) {
        let loader = Arc::new(Counting(AtomicU64::new(0)));
        let cfg = CacheConfig {
            max_chunks: max,
            max_bytes: None,
            policy,
        };
        (loader.clone(), ChunkCache::new(loader, cfg))
    }

    #[test]
    fn strict_lru_evicts_oldest() {
        let (_, c) = cache(2, EvictionPolicy::Lru);
        let (a, b, d) = (ChunkCoord::new(0, 0), ChunkCoord::new(1, 0), ChunkCoord::new(2, 0));
        c.get(a).unwrap();
        c.get(b).unwrap();
        c.get(a).unwrap();
        c.get(d).unwrap();
        assert!(c.contains(a));
        assert!(!c.contains(b));
        assert!(c.contains(d));
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn frequency_window_protects_hot_entries() {
        let (_, c) = cache(3, EvictionPolicy::LruFrequency { window: 3 });
        let hot = ChunkCoord::new(0, 0);
        let warm = ChunkCoord::new(1, 0);
        let cold = ChunkCoord::new(2, 0);
        c.get(hot).unwrap();
        for _ in 0..5 {
            c.get(hot).unwrap();
        }
        c.get(warm).unwrap();
        c.get(warm).unwrap();
        c.get(cold).unwrap();
        // hot is least recent but most used
        c.get(ChunkCoord::new(3, 0)).unwrap();
        assert!(c.contains(hot));
        assert!(c.contains(warm));
        assert!(!c.contains(cold));
    }

    #[test]
    fn frequencies_decay_on_eviction() {
        let e = Entry {
            chunk: Arc::new(Chunk::empty(ChunkCoord::new(0, 0))),
            bytes: 0,
            tick: 0,
            freq: 8,
            epoch: 2,
        };
        assert_eq!(e.frequency(2), 8);
        assert_eq!(e.frequency(3), 4);
        assert_eq!(e.frequency(5), 1);
        assert_eq!(e.frequency(40), 0);
    }

    #[test]
    fn invalidate_drops_region_only() {
        let (loader, c) = cache(16, EvictionPolicy::Lru);
        let inside = ChunkCoord::new(3, 3);
        let outside = ChunkCoord::new(40, 3);
        c.get(inside).unwrap();
        c.get(outside).unwrap();
        c.invalidate(RegionCoord::new(0, 0));
        assert!(!c.contains(inside));
        assert!(c.contains(outside));
        c.get(inside).unwrap();
        assert_eq!(loader.0.load(Ordering::Relaxed), 3);
        let s = c.stats();
        assert_eq!((s.hits, s.misses, s.invalidations), (0, 3, 1));
    }
}
