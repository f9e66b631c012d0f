use serde::Deserialize;

pub type BlockId = u16;
pub type BlockState = u16;
pub type BiomeId = u16;

/// Compact voxel representation used by decoded chunks and the renderer.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct Block {
    pub id: BlockId,
    pub state: BlockState,
}

impl Block {
    pub const AIR: Block = Block { id: 0, state: 0 };

    #[inline]
    pub const fn new(id: BlockId, state: BlockState) -> Self {
        Self { id, state }
    }

    #[inline]
    pub fn has_flag(self, flag: BlockState) -> bool {
        self.state & flag != 0
    }
}

// Block-state properties the renderer cares about, packed into `Block::state`.
pub const STATE_WATERLOGGED: BlockState = 1 << 0;
pub const STATE_SNOWY: BlockState = 1 << 1;
pub const STATE_LIT: BlockState = 1 << 2;

pub(crate) const TRACKED_PROPERTIES: [(&str, &str, BlockState); 3] = [
    ("waterlogged", "true", STATE_WATERLOGGED),
    ("snowy", "true", STATE_SNOWY),
    ("lit", "true", STATE_LIT),
];

/// How a block takes part in meshing and face culling.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    /// Full opaque cube; hides neighbouring faces.
    #[default]
    Solid,
    /// Cube with holes (leaves, glass panes drawn as cubes). Never culls neighbours.
    Cutout,
    /// Semi-transparent cube (glass, ice). Culls only identical neighbours.
    Translucent,
    /// Water, lava. Culls only the same liquid.
    Liquid,
    /// Not drawn at all (air, barriers, light blocks).
    Invisible,
}

impl RenderKind {
    #[inline]
    pub fn is_drawn(self) -> bool {
        !matches!(self, RenderKind::Invisible)
    }
}

/// Biome-dependent color multiplier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tint {
    #[default]
    None,
    Grass,
    Foliage,
    Water,
}
