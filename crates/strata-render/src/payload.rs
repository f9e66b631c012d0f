//! Binary tile payloads.
//!
//! Layout (little endian): magic `STPL`, format version `u16`, kind byte,
//! then the body. A hires body is the mesh (vertex and index counts as `u32`,
//! positions `f32`×3, colors RGBA, packed light, ao, indices `u32`) followed
//! by the column map; a lowres body is the column map alone. A column map is
//! its edge length `u16` and per pixel RGBA plus an `i16` height.

use thiserror::Error;

use crate::columns::{ColumnMap, ColumnPixel};
use crate::mesh::TileMesh;

pub const MAGIC: [u8; 4] = *b"STPL";
pub const FORMAT_VERSION: u16 = 1;

const KIND_EMPTY: u8 = 0;
const KIND_HIRES: u8 = 1;
const KIND_LOWRES: u8 = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct HiresTile {
    pub mesh: TileMesh,
    pub columns: ColumnMap,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LowresTile {
    pub columns: ColumnMap,
}

/// Rendered content of one tile.
#[derive(Clone, Debug, PartialEq)]
pub enum TilePayload {
    /// Nothing to draw. Persisted like any other payload.
    Empty,
    Hires(HiresTile),
    Lowres(LowresTile),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("bad payload magic")]
    BadMagic,
    #[error("unsupported payload format version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown payload kind {0}")]
    UnknownKind(u8),
    #[error("payload truncated")]
    Truncated,
    #[error("{0} trailing bytes after payload")]
    Trailing(usize),
    #[error("inconsistent payload: {0}")]
    Invalid(&'static str),
}

impl TilePayload {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, TilePayload::Empty)
    }

    /// The top-down map a parent tile aggregates from.
    pub fn columns(&self) -> Option<&ColumnMap> {
        match self {
            TilePayload::Empty => None,
            TilePayload::Hires(h) => Some(&h.columns),
            TilePayload::Lowres(l) => Some(&l.columns),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len_hint());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        match self {
            TilePayload::Empty => out.push(KIND_EMPTY),
            TilePayload::Hires(h) => {
                out.push(KIND_HIRES);
                write_mesh(&mut out, &h.mesh);
                write_columns(&mut out, &h.columns);
            }
            TilePayload::Lowres(l) => {
                out.push(KIND_LOWRES);
                write_columns(&mut out, &l.columns);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
        let mut r = Reader { buf: bytes };
        if r.take(4)? != MAGIC {
            return Err(PayloadError::BadMagic);
        }
        let version = r.u16()?;
        if version != FORMAT_VERSION {
            return Err(PayloadError::UnsupportedVersion(version));
        }
        let payload = match r.u8()? {
            KIND_EMPTY => TilePayload::Empty,
            KIND_HIRES => {
                let mesh = read_mesh(&mut r)?;
                let columns = read_columns(&mut r)?;
                TilePayload::Hires(HiresTile { mesh, columns })
            }
            KIND_LOWRES => TilePayload::Lowres(LowresTile {
                columns: read_columns(&mut r)?,
            }),
            other => return Err(PayloadError::UnknownKind(other)),
        };
        if !r.buf.is_empty() {
            return Err(PayloadError::Trailing(r.buf.len()));
        }
        Ok(payload)
    }

    fn encoded_len_hint(&self) -> usize {
        let cols = |m: &ColumnMap| 2 + m.pixels().len() * 6;
        7 + match self {
            TilePayload::Empty => 0,
            TilePayload::Hires(h) => 8 + h.mesh.vertex_count() * 18 + h.mesh.idx.len() * 4 + cols(&h.columns),
            TilePayload::Lowres(l) => cols(&l.columns),
        }
    }
}

/// Version tag of an encoded payload: format version in the high half, CRC32
/// of the bytes in the low half.
pub fn content_version(encoded: &[u8]) -> u64 {
    (u64::from(FORMAT_VERSION) << 32) | u64::from(crc32fast::hash(encoded))
}

fn write_mesh(out: &mut Vec<u8>, m: &TileMesh) {
    out.extend_from_slice(&(m.vertex_count() as u32).to_le_bytes());
    out.extend_from_slice(&(m.idx.len() as u32).to_le_bytes());
    for v in &m.pos {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&m.col);
    out.extend_from_slice(&m.light);
    out.extend_from_slice(&m.ao);
    for i in &m.idx {
        out.extend_from_slice(&i.to_le_bytes());
    }
}

fn write_columns(out: &mut Vec<u8>, m: &ColumnMap) {
    out.extend_from_slice(&m.size().to_le_bytes());
    for p in m.pixels() {
        out.extend_from_slice(&p.color);
        out.extend_from_slice(&p.height.to_le_bytes());
    }
}

fn read_mesh(r: &mut Reader<'_>) -> Result<TileMesh, PayloadError> {
    let vertices = r.u32()? as usize;
    let indices = r.u32()? as usize;
    let pos = r
        .take(vertices.checked_mul(12).ok_or(PayloadError::Truncated)?)?
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let col = r.take(vertices.checked_mul(4).ok_or(PayloadError::Truncated)?)?.to_vec();
    let light = r.take(vertices)?.to_vec();
    let ao = r.take(vertices)?.to_vec();
    let idx: Vec<u32> = r
        .take(indices.checked_mul(4).ok_or(PayloadError::Truncated)?)?
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    if idx.iter().any(|i| *i as usize >= vertices) {
        return Err(PayloadError::Invalid("index out of range"));
    }
    Ok(TileMesh {
        pos,
        col,
        light,
        ao,
        idx,
    })
}

fn read_columns(r: &mut Reader<'_>) -> Result<ColumnMap, PayloadError> {
    let size = r.u16()?;
    let n = size as usize * size as usize;
    let raw = r.take(n * 6)?;
    let pixels = raw
        .chunks_exact(6)
        .map(|b| ColumnPixel {
            color: [b[0], b[1], b[2], b[3]],
            height: i16::from_le_bytes([b[4], b[5]]),
        })
        .collect();
    ColumnMap::from_pixels(size, pixels).ok_or(PayloadError::Invalid("column map size"))
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], PayloadError> {
        if self.buf.len() < n {
            return Err(PayloadError::Truncated);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, PayloadError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, PayloadError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, PayloadError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
