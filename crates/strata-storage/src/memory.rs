use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use strata_render::{TileCoord, TilePayload, content_version};

use crate::{StorageError, TileMeta, TileStorage};

/// Keeps encoded tiles in a map. Writes can be made to fail on demand.
#[derive(Default)]
pub struct MemoryTileStorage {
    tiles: Mutex<HashMap<TileCoord, (TileMeta, Vec<u8>)>>,
    fail_writes: AtomicBool,
    puts: AtomicU64,
}

impl MemoryTileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful `put` calls so far.
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tiles(&self) -> Vec<TileCoord> {
        let mut v: Vec<_> = self.tiles.lock().unwrap().keys().copied().collect();
        v.sort();
        v
    }
}

impl TileStorage for MemoryTileStorage {
    fn metadata(&self, tile: TileCoord) -> Result<Option<TileMeta>, StorageError> {
        Ok(self.tiles.lock().unwrap().get(&tile).map(|(m, _)| *m))
    }

    fn put(&self, tile: TileCoord, payload: &TilePayload, watermark: u64) -> Result<TileMeta, StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                tile,
                path: format!("memory:{tile}").into(),
                source: std::io::Error::other("writes disabled"),
            });
        }
        let bytes = payload.encode();
        let meta = TileMeta {
            watermark,
            content_version: content_version(&bytes),
            stored_len: bytes.len() as u32,
            empty: payload.is_empty(),
        };
        self.tiles.lock().unwrap().insert(tile, (meta, bytes));
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(meta)
    }

    fn get(&self, tile: TileCoord) -> Result<Option<TilePayload>, StorageError> {
        let guard = self.tiles.lock().unwrap();
        let Some((_, bytes)) = guard.get(&tile) else {
            return Ok(None);
        };
        TilePayload::decode(bytes)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                tile,
                reason: e.to_string(),
            })
    }

    fn delete(&self, tile: TileCoord) -> Result<(), StorageError> {
        self.tiles.lock().unwrap().remove(&tile);
        Ok(())
    }
}
