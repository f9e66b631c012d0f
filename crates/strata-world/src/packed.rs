//! Packed long-array decoding for block states, biomes and heightmaps.
//!
//! Two layouts exist. Before data version 2529 entries are packed back to back
//! and may span two longs; from 2529 on each long holds `64 / bits` entries and
//! the leftover high bits are padding.

/// First data version that pads packed arrays instead of spanning longs.
pub const PADDED_SINCE: i32 = 2529;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Packing {
    Spanning,
    Padded,
}

impl Packing {
    #[inline]
    pub fn for_data_version(data_version: i32) -> Self {
        if data_version >= PADDED_SINCE {
            Packing::Padded
        } else {
            Packing::Spanning
        }
    }

    /// Number of longs needed to store `count` entries of `bits` each.
    pub fn longs_needed(self, bits: u32, count: usize) -> usize {
        match self {
            Packing::Spanning => (count * bits as usize).div_ceil(64),
            Packing::Padded => count.div_ceil((64 / bits) as usize),
        }
    }
}

/// Bits needed to index `len` palette entries (at least 1).
#[inline]
pub fn bits_for(len: usize) -> u32 {
    let needed = usize::BITS - len.saturating_sub(1).leading_zeros();
    needed.max(1)
}

/// Unpacks `count` entries of `bits` width. `None` when `data` has the wrong
/// length for the layout or `bits` is out of range.
pub fn unpack(data: &[i64], bits: u32, count: usize, packing: Packing) -> Option<Vec<u16>> {
    if bits == 0 || bits > 16 {
        return None;
    }
    if data.len() != packing.longs_needed(bits, count) {
        return None;
    }
    let mask = (1u64 << bits) - 1;
    let mut out = Vec::with_capacity(count);
    match packing {
        Packing::Padded => {
            let per_long = (64 / bits) as usize;
            for i in 0..count {
                let word = data[i / per_long] as u64;
                let shift = (i % per_long) as u32 * bits;
                out.push(((word >> shift) & mask) as u16);
            }
        }
        Packing::Spanning => {
            for i in 0..count {
                let bit = i * bits as usize;
                let word = bit / 64;
                let shift = (bit % 64) as u32;
                let mut v = (data[word] as u64) >> shift;
                if shift + bits > 64 {
                    v |= (data[word + 1] as u64) << (64 - shift);
                }
                out.push((v & mask) as u16);
            }
        }
    }
    Some(out)
}

/// Heightmaps carry no bit width; infer it from the array length.
pub fn unpack_inferred(data: &[i64], count: usize, packing: Packing) -> Option<Vec<u16>> {
    (1..=16)
        .find(|&bits| packing.longs_needed(bits, count) == data.len())
        .and_then(|bits| unpack(data, bits, count, packing))
}

/// Inverse of [`unpack`]; used to build fixtures.
pub fn pack(values: &[u16], bits: u32, packing: Packing) -> Vec<i64> {
    let mut data = vec![0u64; packing.longs_needed(bits, values.len())];
    match packing {
        Packing::Padded => {
            let per_long = (64 / bits) as usize;
            for (i, v) in values.iter().enumerate() {
                data[i / per_long] |= (*v as u64) << ((i % per_long) as u32 * bits);
            }
        }
        Packing::Spanning => {
            for (i, v) in values.iter().enumerate() {
                let bit = i * bits as usize;
                let shift = (bit % 64) as u32;
                data[bit / 64] |= (*v as u64) << shift;
                if shift + bits > 64 {
                    data[bit / 64 + 1] |= (*v as u64) >> (64 - shift);
                }
            }
        }
    }
    data.into_iter().map(|w| w as i64).collect()
}
