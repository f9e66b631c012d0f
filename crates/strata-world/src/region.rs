//! Region file container: header tables, chunk records and payload
//! decompression.

use std::io::Read;
use std::time::SystemTime;

use flate2::read::{GzDecoder, ZlibDecoder};

pub const SECTOR_BYTES: u64 = 4096;
pub const HEADER_BYTES: usize = 8192;
pub const CHUNKS_PER_REGION: usize = 1024;

/// Flag on the compression byte meaning the payload lives in `c.<x>.<z>.mcc`.
pub const EXTERNAL_FLAG: u8 = 0x80;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zlib,
    None,
    Lz4,
}

impl Compression {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & !EXTERNAL_FLAG {
            1 => Some(Compression::Gzip),
            2 => Some(Compression::Zlib),
            3 => Some(Compression::None),
            4 => Some(Compression::Lz4),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Compression::Gzip => 1,
            Compression::Zlib => 2,
            Compression::None => 3,
            Compression::Lz4 => 4,
        }
    }

    pub fn decompress(self, payload: &[u8]) -> Result<Vec<u8>, String> {
        let mut out = Vec::with_capacity(payload.len() * 4);
        match self {
            Compression::Gzip => GzDecoder::new(payload)
                .read_to_end(&mut out)
                .map(|_| out)
                .map_err(|e| format!("gzip: {e}")),
            Compression::Zlib => ZlibDecoder::new(payload)
                .read_to_end(&mut out)
                .map(|_| out)
                .map_err(|e| format!("zlib: {e}")),
            Compression::None => Ok(payload.to_vec()),
            Compression::Lz4 => decompress_lz4_blocks(payload),
        }
    }
}

/// Location and timestamp tables of one region file, tagged with the file
/// modification time and length they were read at.
#[derive(Clone, Debug)]
pub struct RegionHeader {
    pub mtime: SystemTime,
    pub file_len: u64,
    locations: Box<[u32; CHUNKS_PER_REGION]>,
    timestamps: Box<[u32; CHUNKS_PER_REGION]>,
    truncated: bool,
}

/// Where a chunk record sits in its region file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkLocation {
    pub sector: u32,
    pub sectors: u8,
}

impl ChunkLocation {
    #[inline]
    pub fn byte_offset(self) -> u64 {
        self.sector as u64 * SECTOR_BYTES
    }

    #[inline]
    pub fn byte_len(self) -> u64 {
        self.sectors as u64 * SECTOR_BYTES
    }
}

impl RegionHeader {
    /// An empty region file has no chunks at all.
    pub fn empty(mtime: SystemTime) -> Self {
        RegionHeader {
            mtime,
            file_len: 0,
            locations: Box::new([0; CHUNKS_PER_REGION]),
            timestamps: Box::new([0; CHUNKS_PER_REGION]),
            truncated: false,
        }
    }

    /// A non-empty file too short to hold both tables. It lists no chunks and
    /// every read from it is corrupt.
    pub fn truncated(mtime: SystemTime, file_len: u64) -> Self {
        RegionHeader {
            file_len,
            truncated: true,
            ..RegionHeader::empty(mtime)
        }
    }

    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn parse(bytes: &[u8; HEADER_BYTES], mtime: SystemTime, file_len: u64) -> Self {
        let mut header = RegionHeader::empty(mtime);
        header.file_len = file_len;
        for i in 0..CHUNKS_PER_REGION {
            let loc = &bytes[i * 4..i * 4 + 4];
            let ts = &bytes[4096 + i * 4..4096 + i * 4 + 4];
            header.locations[i] = u32::from_be_bytes([loc[0], loc[1], loc[2], loc[3]]);
            header.timestamps[i] = u32::from_be_bytes([ts[0], ts[1], ts[2], ts[3]]);
        }
        header
    }

    /// `None` when the chunk was never written.
    #[inline]
    pub fn location(&self, index: usize) -> Option<ChunkLocation> {
        let raw = self.locations[index];
        if raw == 0 {
            return None;
        }
        Some(ChunkLocation {
            sector: raw >> 8,
            sectors: (raw & 0xFF) as u8,
        })
    }

    #[inline]
    pub fn timestamp(&self, index: usize) -> u32 {
        self.timestamps[index]
    }

    pub fn is_current(&self, mtime: SystemTime, file_len: u64) -> bool {
        self.mtime == mtime && self.file_len == file_len
    }
}

const LZ4_MAGIC: &[u8; 8] = b"LZ4Block";
const LZ4_HEADER: usize = 8 + 1 + 4 + 4 + 4;
const LZ4_METHOD_RAW: u8 = 0x10;
const LZ4_METHOD_LZ4: u8 = 0x20;

/// Decodes a stream of `LZ4Block` frames as written by the Java LZ4 block
/// output stream. Checksums are not verified.
pub fn decompress_lz4_blocks(mut input: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    while !input.is_empty() {
        if input.len() < LZ4_HEADER || &input[..8] != LZ4_MAGIC {
            return Err("lz4: bad block header".into());
        }
        let token = input[8];
        let le = |at: usize| i32::from_le_bytes([input[at], input[at + 1], input[at + 2], input[at + 3]]);
        let compressed_len = le(9);
        let original_len = le(13);
        if compressed_len < 0 || original_len < 0 {
            return Err("lz4: negative block length".into());
        }
        let (compressed_len, original_len) = (compressed_len as usize, original_len as usize);
        let body = input
            .get(LZ4_HEADER..LZ4_HEADER + compressed_len)
            .ok_or("lz4: truncated block")?;
        if original_len == 0 {
            break;
        }
        match token & 0xF0 {
            LZ4_METHOD_RAW => {
                if compressed_len != original_len {
                    return Err("lz4: raw block length mismatch".into());
                }
                out.extend_from_slice(body);
            }
            LZ4_METHOD_LZ4 => {
                let block = lz4_flex::block::decompress(body, original_len)
                    .map_err(|e| format!("lz4: {e}"))?;
                if block.len() != original_len {
                    return Err("lz4: short block".into());
                }
                out.extend_from_slice(&block);
            }
            m => return Err(format!("lz4: unknown block method {m:#x}")),
        }
        input = &input[LZ4_HEADER + compressed_len..];
    }
    Ok(out)
}

/// Encodes `data` as a single compressed `LZ4Block` frame plus end marker.
pub fn compress_lz4_blocks(data: &[u8]) -> Vec<u8> {
    let body = lz4_flex::block::compress(data);
    let mut out = Vec::with_capacity(body.len() + LZ4_HEADER * 2);
    out.extend_from_slice(LZ4_MAGIC);
    out.push(LZ4_METHOD_LZ4);
    out.extend_from_slice(&(body.len() as i32).to_le_bytes());
    out.extend_from_slice(&(data.len() as i32).to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(LZ4_MAGIC);
    out.push(LZ4_METHOD_RAW);
    out.extend_from_slice(&[0u8; 12]);
    out
}
