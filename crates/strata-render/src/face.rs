use strata_geom::Vec3;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Face {
    PosY = 0,
    NegY = 1,
    PosX = 2,
    NegX = 3,
    PosZ = 4,
    NegZ = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::PosY,
        Face::NegY,
        Face::PosX,
        Face::NegX,
        Face::PosZ,
        Face::NegZ,
    ];

    /// Returns the `[0..6)` index of this face.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Converts a face index `[0..6)` back into a `Face` value.
    /// Falls back to `PosY` for out-of-range indices.
    #[inline]
    pub fn from_index(i: usize) -> Face {
        match i {
            0 => Face::PosY,
            1 => Face::NegY,
            2 => Face::PosX,
            3 => Face::NegX,
            4 => Face::PosZ,
            5 => Face::NegZ,
            _ => Face::PosY,
        }
    }

    #[inline]
    pub fn normal(self) -> Vec3 {
        let (x, y, z) = self.delta();
        Vec3::new(x as f32, y as f32, z as f32)
    }

    /// Integer step `(dx, dy, dz)` out of this face.
    #[inline]
    pub fn delta(self) -> (i32, i32, i32) {
        match self {
            Face::PosY => (0, 1, 0),
            Face::NegY => (0, -1, 0),
            Face::PosX => (1, 0, 0),
            Face::NegX => (-1, 0, 0),
            Face::PosZ => (0, 0, 1),
            Face::NegZ => (0, 0, -1),
        }
    }

    /// Fixed directional brightness so the relief stays readable without a
    /// light source in the viewer.
    #[inline]
    pub fn shade(self) -> f32 {
        match self {
            Face::PosY => 1.0,
            Face::NegY => 0.6,
            Face::PosX | Face::NegX => 0.8,
            Face::PosZ | Face::NegZ => 0.9,
        }
    }

    /// Unit-cube corners of the face, counter-clockwise seen from outside.
    #[inline]
    pub fn corners(self) -> [(i32, i32, i32); 4] {
        match self {
            Face::PosY => [(0, 1, 0), (0, 1, 1), (1, 1, 1), (1, 1, 0)],
            Face::NegY => [(0, 0, 0), (1, 0, 0), (1, 0, 1), (0, 0, 1)],
            Face::PosX => [(1, 0, 0), (1, 1, 0), (1, 1, 1), (1, 0, 1)],
            Face::NegX => [(0, 0, 0), (0, 0, 1), (0, 1, 1), (0, 1, 0)],
            Face::PosZ => [(0, 0, 1), (1, 0, 1), (1, 1, 1), (0, 1, 1)],
            Face::NegZ => [(0, 0, 0), (0, 1, 0), (1, 1, 0), (1, 0, 0)],
        }
    }

    /// The two in-plane axes of the face as unit steps, used to find the
    /// occluders around a corner.
    #[inline]
    pub fn tangents(self) -> [(i32, i32, i32); 2] {
        match self {
            Face::PosY | Face::NegY => [(1, 0, 0), (0, 0, 1)],
            Face::PosX | Face::NegX => [(0, 1, 0), (0, 0, 1)],
            Face::PosZ | Face::NegZ => [(1, 0, 0), (0, 1, 0)],
        }
    }
}
