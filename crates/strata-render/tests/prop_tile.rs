mod common;

use std::sync::Arc;

use common::*;
use proptest::prelude::*;
use strata_blocks::{Block, BlockRegistry};
use strata_chunk::ChunkCoord;
use strata_render::{RenderSettings, TileCoord, TileGrid, TileRenderer};

fn grid() -> impl Strategy<Value = TileGrid> {
    (1u32..=4, 2u32..=4, 2u8..=5).prop_map(|(t, n, l)| TileGrid::new(t, n, l))
}

proptest! {
    // Children cover the parent exactly: inside it, pairwise disjoint, same area
    #[test]
    fn children_tile_the_parent(grid in grid(), x in -50i32..50, z in -50i32..50, lod in 1u8..=4) {
        let lod = lod.min(grid.max_lod()).max(1);
        let parent = TileCoord::new(x, z, lod);
        let pf = grid.footprint(parent);
        let kids = grid.children(parent);
        prop_assert_eq!(kids.len(), (grid.lod_factor * grid.lod_factor) as usize);
        let mut area = 0i64;
        for (i, a) in kids.iter().enumerate() {
            let fa = grid.footprint(*a);
            prop_assert_eq!(grid.parent(*a), Some(parent));
            prop_assert!(fa.min_x >= pf.min_x && fa.max_x <= pf.max_x);
            prop_assert!(fa.min_z >= pf.min_z && fa.max_z <= pf.max_z);
            area += fa.width() as i64 * fa.width() as i64;
            for b in &kids[i + 1..] {
                let fb = grid.footprint(*b);
                let disjoint = fa.max_x <= fb.min_x || fb.max_x <= fa.min_x
                    || fa.max_z <= fb.min_z || fb.max_z <= fa.min_z;
                prop_assert!(disjoint);
            }
        }
        prop_assert_eq!(area, pf.width() as i64 * pf.width() as i64);
    }

    // Every block column belongs to exactly the hires tile whose footprint holds it
    #[test]
    fn hires_tile_of_chunk_contains_it(grid in grid(), cx in -500i32..500, cz in -500i32..500) {
        let chunk = ChunkCoord::new(cx, cz);
        let tile = grid.hires_tile_of(chunk);
        let (bx, bz) = chunk.block_origin();
        prop_assert!(grid.footprint(tile).contains(bx, bz));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn same_chunks_same_bytes(heights in prop::collection::vec(1i32..60, 256), seed in 0usize..4) {
        let reg = Arc::new(BlockRegistry::builtin());
        let names = ["stone", "grass_block", "water", "oak_leaves"];
        let top = block(&reg, names[seed]);
        let stone = block(&reg, "stone");
        let mut src = flat_world(&reg, -1, 2, "dirt", 30);
        let hs = heights.clone();
        src.insert(chunk_from_fn(&reg, ChunkCoord::new(1, 0), 4, None, move |x, y, z| {
            let h = hs[z * 16 + x];
            if y < h - 1 { stone } else if y < h { top } else { Block::AIR }
        }));
        let src = Arc::new(src);
        let render = || {
            let r = TileRenderer::new(src.clone(), reg.clone(), TileGrid::default(), RenderSettings::default());
            r.render_hires(TileCoord::hires(0, 0)).unwrap().encode()
        };
        prop_assert_eq!(render(), render());
    }
}
