use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use strata_blocks::BlockRegistry;
use strata_chunk::{Chunk, ChunkCoord, RegionCoord};

use crate::error::WorldError;
use crate::nbt::{ChunkNbt, decode_chunk};
use crate::region::{CHUNKS_PER_REGION, Compression, EXTERNAL_FLAG, HEADER_BYTES, RegionHeader};

/// Anything that can produce decoded chunks for the cache.
pub trait ChunkLoader: Send + Sync {
    fn read_chunk(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, WorldError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ReaderStats {
    pub chunks_read: u64,
    pub absent_chunks: u64,
    pub corrupt_chunks: u64,
    pub unknown_blocks: u64,
    pub unknown_biomes: u64,
    pub header_reads: u64,
}

/// Read-only access to a directory of region files.
///
/// Each chunk read opens its own file handle, so any number of threads can
/// read concurrently. Region headers are cached and reread when the file's
/// modification time or length changes.
pub struct WorldReader {
    region_dir: PathBuf,
    registry: Arc<BlockRegistry>,
    headers: RwLock<HashMap<RegionCoord, Arc<RegionHeader>>>,
    chunks_read: AtomicU64,
    absent_chunks: AtomicU64,
    corrupt_chunks: AtomicU64,
    unknown_blocks: AtomicU64,
    unknown_biomes: AtomicU64,
    header_reads: AtomicU64,
}

impl WorldReader {
    /// `path` is either a world save (with a `region/` directory) or the
    /// region directory itself.
    pub fn open(path: impl AsRef<Path>, registry: Arc<BlockRegistry>) -> Self {
        let path = path.as_ref();
        let nested = path.join("region");
        let region_dir = if nested.is_dir() {
            nested
        } else {
            path.to_path_buf()
        };
        log::debug!(target: "world", "reading regions from {}", region_dir.display());
        WorldReader {
            region_dir,
            registry,
            headers: RwLock::new(HashMap::new()),
            chunks_read: AtomicU64::new(0),
            absent_chunks: AtomicU64::new(0),
            corrupt_chunks: AtomicU64::new(0),
            unknown_blocks: AtomicU64::new(0),
            unknown_biomes: AtomicU64::new(0),
            header_reads: AtomicU64::new(0),
        }
    }

    pub fn region_dir(&self) -> &Path {
        &self.region_dir
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn region_path(&self, region: RegionCoord) -> PathBuf {
        self.region_dir.join(region.file_name())
    }

    pub fn stats(&self) -> ReaderStats {
        ReaderStats {
            chunks_read: self.chunks_read.load(Ordering::Relaxed),
            absent_chunks: self.absent_chunks.load(Ordering::Relaxed),
            corrupt_chunks: self.corrupt_chunks.load(Ordering::Relaxed),
            unknown_blocks: self.unknown_blocks.load(Ordering::Relaxed),
            unknown_biomes: self.unknown_biomes.load(Ordering::Relaxed),
            header_reads: self.header_reads.load(Ordering::Relaxed),
        }
    }

    /// Region files present in the directory, sorted.
    pub fn list_regions(&self) -> Result<Vec<RegionCoord>, WorldError> {
        let io_err = |source: io::Error| WorldError::Io {
            path: self.region_dir.clone(),
            source: Arc::new(source),
        };
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.region_dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if let Some(region) = entry.file_name().to_str().and_then(RegionCoord::from_file_name) {
                out.push(region);
            }
        }
        out.sort();
        Ok(out)
    }

    /// `None` when the region file does not exist.
    pub fn region_modification_time(
        &self,
        region: RegionCoord,
    ) -> Result<Option<SystemTime>, WorldError> {
        match fs::metadata(self.region_path(region)) {
            Ok(meta) => meta
                .modified()
                .map(Some)
                .map_err(|e| WorldError::unavailable(region, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WorldError::unavailable(region, e)),
        }
    }

    /// Header timestamps of every chunk present in the region. Empty when the
    /// region file does not exist.
    pub fn chunk_timestamps(&self, region: RegionCoord) -> Result<Vec<(ChunkCoord, u32)>, WorldError> {
        let Some(header) = self.header(region)? else {
            return Ok(Vec::new());
        };
        Ok((0..CHUNKS_PER_REGION)
            .filter(|&i| header.location(i).is_some())
            .map(|i| (ChunkCoord::from_local(region, i), header.timestamp(i)))
            .collect())
    }

    /// Cached header, reread when the file changed. `None` when the region
    /// file does not exist.
    fn header(&self, region: RegionCoord) -> Result<Option<Arc<RegionHeader>>, WorldError> {
        let path = self.region_path(region);
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WorldError::unavailable(region, e)),
        };
        let mtime = meta.modified().map_err(|e| WorldError::unavailable(region, e))?;
        let len = meta.len();
        if let Some(h) = self.headers.read().unwrap().get(&region) {
            if h.is_current(mtime, len) {
                return Ok(Some(h.clone()));
            }
        }

        let header = if len == 0 {
            RegionHeader::empty(mtime)
        } else {
            let mut file = File::open(&path).map_err(|e| WorldError::unavailable(region, e))?;
            let mut raw = [0u8; HEADER_BYTES];
            match file.read_exact(&mut raw) {
                Ok(()) => RegionHeader::parse(&raw, mtime, len),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    log::warn!(
                        target: "world",
                        "region {}.{}: {len} byte file is shorter than its header",
                        region.x,
                        region.z
                    );
                    RegionHeader::truncated(mtime, len)
                }
                Err(e) => return Err(WorldError::unavailable(region, format!("header: {e}"))),
            }
        };
        self.header_reads.fetch_add(1, Ordering::Relaxed);
        let header = Arc::new(header);
        self.headers
            .write()
            .unwrap()
            .insert(region, header.clone());
        Ok(Some(header))
    }

    /// Reads and decodes one chunk. Chunks that were never written, or whose
    /// region file does not exist, come back as the empty sentinel.
    pub fn read_chunk(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, WorldError> {
        let result = self.read_chunk_inner(coord);
        match &result {
            Ok(c) if c.is_empty() => {
                self.absent_chunks.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {
                self.chunks_read.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_corrupt() => {
                self.corrupt_chunks.fetch_add(1, Ordering::Relaxed);
                log::warn!(target: "world", "{e}");
            }
            Err(e) => log::error!(target: "world", "{e}"),
        }
        result
    }

    fn read_chunk_inner(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, WorldError> {
        let region = coord.region();
        let Some(header) = self.header(region)? else {
            return Ok(Arc::new(Chunk::empty(coord)));
        };
        if header.is_truncated() {
            return Err(WorldError::corrupt(coord, "region header truncated"));
        }
        let Some(loc) = header.location(coord.local_index()) else {
            return Ok(Arc::new(Chunk::empty(coord)));
        };
        if loc.sector < 2 {
            return Err(WorldError::corrupt(coord, "location points into the header"));
        }
        if loc.byte_offset() + 5 > header.file_len {
            return Err(WorldError::corrupt(coord, "location past end of file"));
        }

        let mut file =
            File::open(self.region_path(region)).map_err(|e| WorldError::unavailable(region, e))?;
        let read_err = |e: io::Error| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                WorldError::corrupt(coord, "truncated chunk record")
            } else {
                WorldError::unavailable(region, e)
            }
        };
        file.seek(SeekFrom::Start(loc.byte_offset()))
            .map_err(read_err)?;
        let mut prefix = [0u8; 5];
        file.read_exact(&mut prefix).map_err(read_err)?;
        let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as u64;
        let compression_byte = prefix[4];
        if length == 0 {
            return Err(WorldError::corrupt(coord, "zero-length chunk record"));
        }
        if length + 4 > loc.byte_len() {
            return Err(WorldError::corrupt(
                coord,
                format!("record of {length} bytes exceeds {} sectors", loc.sectors),
            ));
        }
        let compression = Compression::from_byte(compression_byte).ok_or_else(|| {
            WorldError::corrupt(coord, format!("unsupported compression {compression_byte}"))
        })?;

        let payload = if compression_byte & EXTERNAL_FLAG != 0 {
            let mcc = self
                .region_dir
                .join(format!("c.{}.{}.mcc", coord.x, coord.z));
            fs::read(&mcc).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    WorldError::corrupt(coord, format!("missing external chunk {}", mcc.display()))
                }
                _ => WorldError::unavailable(region, e),
            })?
        } else {
            let mut buf = vec![0u8; (length - 1) as usize];
            file.read_exact(&mut buf).map_err(read_err)?;
            buf
        };

        let raw = compression
            .decompress(&payload)
            .map_err(|e| WorldError::corrupt(coord, e))?;
        let nbt: ChunkNbt = fastnbt::from_bytes(&raw)
            .map_err(|e| WorldError::corrupt(coord, format!("nbt: {e}")))?;
        let (chunk, report) = decode_chunk(coord, &nbt, &self.registry)
            .map_err(|e| WorldError::corrupt(coord, e))?;
        if report.unknown_blocks > 0 || report.unknown_biomes > 0 {
            self.unknown_blocks
                .fetch_add(report.unknown_blocks as u64, Ordering::Relaxed);
            self.unknown_biomes
                .fetch_add(report.unknown_biomes as u64, Ordering::Relaxed);
            log::debug!(
                target: "world",
                "chunk ({}, {}): {} unknown block states, {} unknown biomes",
                coord.x,
                coord.z,
                report.unknown_blocks,
                report.unknown_biomes
            );
        }
        Ok(Arc::new(chunk))
    }
}

impl ChunkLoader for WorldReader {
    fn read_chunk(&self, coord: ChunkCoord) -> Result<Arc<Chunk>, WorldError> {
        WorldReader::read_chunk(self, coord)
    }
}
