use strata_render::TileCoord;

use crate::StorageError;

pub const MAGIC: [u8; 4] = *b"STIL";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 32;

pub const FLAG_GZIP: u16 = 1 << 0;
pub const FLAG_EMPTY: u16 = 1 << 1;

/// What is known about a stored tile without reading its payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileMeta {
    /// Newest chunk timestamp the tile was rendered from.
    pub watermark: u64,
    /// Version tag of the encoded payload.
    pub content_version: u64,
    /// Stored byte length, after compression.
    pub stored_len: u32,
    pub empty: bool,
}

/// Fixed-size little-endian file header:
/// magic, version, flags, watermark, content version, payload length, CRC32.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileHeader {
    pub flags: u16,
    pub watermark: u64,
    pub content_version: u64,
    pub payload_len: u32,
    pub crc32: u32,
}

impl TileHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&VERSION.to_le_bytes());
        out[6..8].copy_from_slice(&self.flags.to_le_bytes());
        out[8..16].copy_from_slice(&self.watermark.to_le_bytes());
        out[16..24].copy_from_slice(&self.content_version.to_le_bytes());
        out[24..28].copy_from_slice(&self.payload_len.to_le_bytes());
        out[28..32].copy_from_slice(&self.crc32.to_le_bytes());
        out
    }

    pub fn decode(tile: TileCoord, bytes: &[u8]) -> Result<Self, StorageError> {
        let corrupt = |reason: &str| StorageError::Corrupt {
            tile,
            reason: reason.to_string(),
        };
        if bytes.len() < HEADER_LEN {
            return Err(corrupt("short header"));
        }
        if bytes[0..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let u64_at = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[i..i + 8]);
            u64::from_le_bytes(b)
        };
        let version = u16_at(4);
        if version != VERSION {
            return Err(corrupt(&format!("unsupported version {version}")));
        }
        Ok(TileHeader {
            flags: u16_at(6),
            watermark: u64_at(8),
            content_version: u64_at(16),
            payload_len: u32_at(24),
            crc32: u32_at(28),
        })
    }

    pub fn meta(&self) -> TileMeta {
        TileMeta {
            watermark: self.watermark,
            content_version: self.content_version,
            stored_len: self.payload_len,
            empty: self.flags & FLAG_EMPTY != 0,
        }
    }
}
