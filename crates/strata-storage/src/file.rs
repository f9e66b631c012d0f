use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, warn};
use strata_render::{TileCoord, TilePayload, content_version};

use crate::header::{FLAG_EMPTY, FLAG_GZIP, HEADER_LEN, TileHeader};
use crate::{StorageError, TileMeta, TileStorage};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Tiles as files under `<root>/<lod>/x<X>/z<Z>.tile`.
pub struct FileTileStorage {
    root: PathBuf,
    compress: bool,
}

impl FileTileStorage {
    pub fn new(root: impl Into<PathBuf>, compress: bool) -> Self {
        FileTileStorage {
            root: root.into(),
            compress,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, tile: TileCoord) -> PathBuf {
        self.root
            .join(tile.lod.to_string())
            .join(format!("x{}", tile.x))
            .join(format!("z{}.tile", tile.z))
    }

    fn read_file(&self, tile: TileCoord) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.tile_path(tile);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { tile, path, source }),
        }
    }

    fn write_atomic(&self, tile: TileCoord, path: &Path, header: &[u8], body: &[u8]) -> io::Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tile");
        let tmp = TempFile {
            path: dir.join(format!(
                ".{name}.{}.{}.tmp",
                std::process::id(),
                TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
            )),
            armed: true,
        };
        {
            let mut writer = BufWriter::new(File::create(&tmp.path)?);
            writer.write_all(header)?;
            writer.write_all(body)?;
            writer.flush()?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp.path, path)?;
        tmp.disarm();
        fsync_directory(dir);
        debug!(target: "storage", "wrote tile {tile} ({} bytes)", header.len() + body.len());
        Ok(())
    }
}

impl TileStorage for FileTileStorage {
    fn metadata(&self, tile: TileCoord) -> Result<Option<TileMeta>, StorageError> {
        let path = self.tile_path(tile);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Read { tile, path, source }),
        };
        let mut head = [0u8; HEADER_LEN];
        match file.read_exact(&mut head) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(StorageError::Corrupt {
                    tile,
                    reason: "short header".into(),
                });
            }
            Err(source) => return Err(StorageError::Read { tile, path, source }),
        }
        Ok(Some(TileHeader::decode(tile, &head)?.meta()))
    }

    fn put(&self, tile: TileCoord, payload: &TilePayload, watermark: u64) -> Result<TileMeta, StorageError> {
        let path = self.tile_path(tile);
        let write_err = |source: io::Error| StorageError::Write {
            tile,
            path: path.clone(),
            source,
        };
        let encoded = payload.encode();
        let mut flags = 0;
        if payload.is_empty() {
            flags |= FLAG_EMPTY;
        }
        let body = if self.compress {
            flags |= FLAG_GZIP;
            let mut enc = GzEncoder::new(Vec::with_capacity(encoded.len() / 2), Compression::default());
            enc.write_all(&encoded).map_err(write_err)?;
            enc.finish().map_err(write_err)?
        } else {
            encoded.clone()
        };
        let header = TileHeader {
            flags,
            watermark,
            content_version: content_version(&encoded),
            payload_len: body.len() as u32,
            crc32: crc32fast::hash(&body),
        };
        self.write_atomic(tile, &path, &header.encode(), &body)
            .map_err(|source| {
                warn!(target: "storage", "tile {tile}: write failed: {source}");
                write_err(source)
            })?;
        Ok(header.meta())
    }

    fn get(&self, tile: TileCoord) -> Result<Option<TilePayload>, StorageError> {
        let Some(bytes) = self.read_file(tile)? else {
            return Ok(None);
        };
        let corrupt = |reason: String| {
            warn!(target: "storage", "tile {tile}: {reason}");
            StorageError::Corrupt { tile, reason }
        };
        let header = TileHeader::decode(tile, &bytes)?;
        let body = &bytes[HEADER_LEN..];
        if body.len() != header.payload_len as usize {
            return Err(corrupt(format!(
                "length {} does not match header {}",
                body.len(),
                header.payload_len
            )));
        }
        if crc32fast::hash(body) != header.crc32 {
            return Err(corrupt("checksum mismatch".into()));
        }
        let encoded = if header.flags & FLAG_GZIP != 0 {
            let mut out = Vec::with_capacity(body.len() * 2);
            GzDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(|e| corrupt(format!("gzip: {e}")))?;
            out
        } else {
            body.to_vec()
        };
        if content_version(&encoded) != header.content_version {
            return Err(corrupt("content version mismatch".into()));
        }
        TilePayload::decode(&encoded)
            .map(Some)
            .map_err(|e| corrupt(e.to_string()))
    }

    fn delete(&self, tile: TileCoord) -> Result<(), StorageError> {
        let path = self.tile_path(tile);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Write { tile, path, source }),
        }
    }
}

/// Removes the temporary file on drop unless it was renamed into place.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn fsync_directory(path: &Path) {
    if let Ok(dir) = File::open(path) {
        let _ = dir.sync_all();
    }
}
