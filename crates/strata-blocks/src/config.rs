use serde::Deserialize;

use crate::types::{RenderKind, Tint};

// Top-level palette table
#[derive(Deserialize, Debug, Clone)]
pub struct PaletteConfig {
    pub format_version: u32,
    // Name used for block states missing from the table; defaults to "strata:unknown".
    #[serde(default)]
    pub unknown_block: Option<String>,
    // Biome used when a chunk names a biome missing from the table.
    #[serde(default)]
    pub default_biome: Option<String>,
    #[serde(default)]
    pub blocks: Vec<BlockDef>,
    #[serde(default)]
    pub biomes: Vec<BiomeDef>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BlockDef {
    pub name: String,
    pub color: ColorDef,
    #[serde(default)]
    pub kind: Option<RenderKind>,
    // Defaults to true for solid blocks.
    #[serde(default)]
    pub occluding: Option<bool>,
    #[serde(default)]
    pub tint: Option<Tint>,
    #[serde(default)]
    pub emission: Option<u8>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BiomeDef {
    pub name: String,
    pub grass: ColorDef,
    pub foliage: ColorDef,
    pub water: ColorDef,
}

// Colors are either "#rrggbb" / "#rrggbbaa" strings or [r, g, b(, a)] arrays
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ColorDef {
    Hex(String),
    Components(Vec<u8>),
}

impl ColorDef {
    pub fn to_rgba8(&self) -> Option<[u8; 4]> {
        match self {
            ColorDef::Components(v) => match v.as_slice() {
                [r, g, b] => Some([*r, *g, *b, 255]),
                [r, g, b, a] => Some([*r, *g, *b, *a]),
                _ => None,
            },
            ColorDef::Hex(s) => {
                let hex = s.strip_prefix('#').unwrap_or(s);
                if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
                    return None;
                }
                let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                let a = if hex.len() == 8 { byte(6)? } else { 255 };
                Some([byte(0)?, byte(2)?, byte(4)?, a])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_component_colors() {
        assert_eq!(
            ColorDef::Hex("#7f7f7f".into()).to_rgba8(),
            Some([127, 127, 127, 255])
        );
        assert_eq!(
            ColorDef::Hex("10203040".into()).to_rgba8(),
            Some([0x10, 0x20, 0x30, 0x40])
        );
        assert_eq!(ColorDef::Components(vec![1, 2, 3]).to_rgba8(), Some([1, 2, 3, 255]));
        assert_eq!(ColorDef::Components(vec![1, 2]).to_rgba8(), None);
        assert_eq!(ColorDef::Hex("#zzzzzz".into()).to_rgba8(), None);
    }
}
