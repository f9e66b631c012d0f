use strata_geom::{Aabb, Vec3};

use crate::face::Face;

/// Pre-baked tile geometry. Positions are relative to the tile's minimum
/// block corner; every attribute array is per-vertex.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct TileMesh {
    pub pos: Vec<f32>,
    /// RGBA with the directional shade already applied.
    pub col: Vec<u8>,
    /// `sky << 4 | block`.
    pub light: Vec<u8>,
    /// 255 is unoccluded.
    pub ao: Vec<u8>,
    pub idx: Vec<u32>,
}

impl TileMesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.pos.len() / 3
    }

    #[inline]
    pub fn quad_count(&self) -> usize {
        self.idx.len() / 6
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// Pre-reserve capacity for approximately `n_quads` quads worth of data.
    pub fn reserve_quads(&mut self, n_quads: usize) {
        self.pos.reserve(n_quads * 4 * 3);
        self.col.reserve(n_quads * 4 * 4);
        self.light.reserve(n_quads * 4);
        self.ao.reserve(n_quads * 4);
        self.idx.reserve(n_quads * 6);
    }

    /// Appends the unit face of the block whose minimum corner is `origin`.
    pub fn add_face(&mut self, face: Face, origin: Vec3, rgba: [u8; 4], light: u8, ao: [u8; 4]) {
        let base = self.vertex_count() as u32;
        for (cx, cy, cz) in face.corners() {
            self.pos.extend_from_slice(&[
                origin.x + cx as f32,
                origin.y + cy as f32,
                origin.z + cz as f32,
            ]);
            self.col.extend_from_slice(&rgba);
            self.light.push(light);
        }
        self.ao.extend_from_slice(&ao);
        // Split along the brighter diagonal so occlusion interpolates evenly.
        let (a0, a1, a2, a3) = (ao[0] as u32, ao[1] as u32, ao[2] as u32, ao[3] as u32);
        if a0 + a2 < a1 + a3 {
            self.idx
                .extend_from_slice(&[base + 1, base + 2, base + 3, base + 1, base + 3, base]);
        } else {
            self.idx
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }

    pub fn bounds(&self) -> Aabb {
        let mut b = Aabb::EMPTY;
        for p in self.pos.chunks_exact(3) {
            b.include(Vec3::new(p[0], p[1], p[2]));
        }
        b
    }
}
