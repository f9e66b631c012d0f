mod common;

use std::sync::Arc;

use common::*;
use strata_blocks::{Block, BlockRegistry};
use strata_chunk::{Chunk, ChunkCoord, RegionCoord};
use strata_render::{
    DownsampleMode, RenderError, RenderSettings, TileCoord, TileGrid, TilePayload, TileRenderer,
};

fn renderer(reg: &Arc<BlockRegistry>, src: MapSource, settings: RenderSettings) -> TileRenderer {
    TileRenderer::new(Arc::new(src), reg.clone(), TileGrid::default(), settings)
}

fn hires(p: &TilePayload) -> &strata_render::HiresTile {
    match p {
        TilePayload::Hires(h) => h,
        other => panic!("expected hires payload, got {other:?}"),
    }
}

#[test]
fn stone_plain_renders_uniform_tops_without_edge_faces() {
    let reg = Arc::new(BlockRegistry::builtin());
    let r = renderer(&reg, flat_world(&reg, -1, 2, "stone", 64), RenderSettings::default());
    let p = r.render_hires(TileCoord::hires(0, 0)).unwrap();
    let h = hires(&p);

    // one top quad per column and nothing along the tile border
    assert_eq!(h.mesh.quad_count(), 32 * 32);
    let stone = reg.block(reg.id_by_name("stone").unwrap()).color;
    assert!(h.mesh.col.chunks_exact(4).all(|c| c == &stone[..]));
    assert!(h.mesh.pos.chunks_exact(3).all(|v| v[1] == 64.0));
    assert!(h.mesh.light.iter().all(|l| *l == 0xF0));
    assert!(h.mesh.ao.iter().all(|a| *a == 255));

    let first = h.columns.get(0, 0);
    assert_eq!(h.columns.size(), 32);
    assert_eq!(first.height, 64);
    assert_eq!(first.color[3], 255);
    assert!(h.columns.pixels().iter().all(|px| *px == first));
}

#[test]
fn rendering_is_deterministic() {
    let reg = Arc::new(BlockRegistry::builtin());
    let mut src = flat_world(&reg, -1, 2, "grass_block", 60);
    let water = block(&reg, "water");
    let glass = block(&reg, "glass");
    let stone = block(&reg, "stone");
    src.insert(chunk_from_fn(&reg, ChunkCoord::new(1, 1), 5, None, move |x, y, z| {
        let h = 40 + ((x * 7 + z * 3) % 17) as i32;
        match y {
            _ if y < h => stone,
            _ if y < 62 && x < 8 => water,
            _ if y == h && z % 5 == 0 => glass,
            _ => Block::AIR,
        }
    }));
    let r = renderer(&reg, src, RenderSettings::default());
    let a = r.render_hires(TileCoord::hires(0, 0)).unwrap();
    let b = r.render_hires(TileCoord::hires(0, 0)).unwrap();
    assert_eq!(a.encode(), b.encode());
    assert_eq!(TilePayload::decode(&a.encode()).unwrap(), a);
}

#[test]
fn culling_follows_block_kinds() {
    let reg = Arc::new(BlockRegistry::builtin());
    let stone = block(&reg, "stone");
    let glass = block(&reg, "glass");
    let mut src = MapSource::default();
    src.insert(chunk_from_fn(&reg, ChunkCoord::new(0, 0), 1, None, move |x, y, z| {
        match (x, y, z) {
            (5, 10, 5) | (13, 10, 12) => stone,
            (8, 10, 8) | (9, 10, 8) | (12, 10, 12) => glass,
            _ => Block::AIR,
        }
    }));
    let r = renderer(&reg, src, RenderSettings::default());
    let p = r.render_hires(TileCoord::hires(0, 0)).unwrap();
    // lone stone 6, glass pair 10, glass against stone 5, stone against glass 6
    assert_eq!(hires(&p).mesh.quad_count(), 27);
}

#[test]
fn corners_next_to_blocks_are_occluded() {
    let reg = Arc::new(BlockRegistry::builtin());
    let stone = block(&reg, "stone");
    let mut src = flat_world(&reg, -1, 2, "stone", 64);
    src.insert(chunk_from_fn(&reg, ChunkCoord::new(0, 0), 5, None, move |x, y, z| {
        if y < 64 || (x, y, z) == (5, 64, 5) { stone } else { Block::AIR }
    }));
    let r = renderer(&reg, src, RenderSettings::default());
    let p = r.render_hires(TileCoord::hires(0, 0)).unwrap();
    let mesh = &hires(&p).mesh;
    // the floor face under the block is hidden, the block shows five
    assert_eq!(mesh.quad_count(), 32 * 32 - 1 + 5);
    assert!(mesh.ao.contains(&191));
    assert!(mesh.ao.iter().filter(|a| **a < 255).count() >= 8);
}

#[test]
fn stored_light_and_emission_reach_faces() {
    let reg = Arc::new(BlockRegistry::builtin());
    let glow = block(&reg, "glowstone");
    let mut src = MapSource::default();
    for z in -1..=2 {
        for x in -1..=2 {
            src.insert(chunk_from_fn(&reg, ChunkCoord::new(x, z), 5, Some(7), move |_, y, _| {
                if y < 64 { glow } else { Block::AIR }
            }));
        }
    }
    let r = renderer(&reg, src, RenderSettings::default());
    let p = r.render_hires(TileCoord::hires(0, 0)).unwrap();
    assert!(hires(&p).mesh.light.iter().all(|l| *l == 0x7F));
}

fn cave_world(reg: &BlockRegistry) -> MapSource {
    let stone = block(reg, "stone");
    let mut src = flat_world(reg, -1, 2, "stone", 64);
    src.insert(chunk_from_fn(reg, ChunkCoord::new(0, 0), 5, None, move |x, y, z| {
        let pocket = (20..23).contains(&y) && (4..8).contains(&x) && (4..8).contains(&z);
        if y < 64 && !pocket { stone } else { Block::AIR }
    }));
    src
}

#[test]
fn caves_and_top_only() {
    let reg = Arc::new(BlockRegistry::builtin());
    let tile = TileCoord::hires(0, 0);
    let quads = |settings: RenderSettings| {
        let r = renderer(&reg, cave_world(&reg), settings);
        hires(&r.render_hires(tile).unwrap()).mesh.quad_count()
    };
    let all = quads(RenderSettings::default());
    // pocket walls: 4 sides of 4x3, floor and ceiling of 4x4
    assert_eq!(all, 1024 + 4 * 12 + 2 * 16);
    let no_caves = quads(RenderSettings {
        render_caves: false,
        ..Default::default()
    });
    assert_eq!(no_caves, 1024);
    let top_only = quads(RenderSettings {
        render_top_only: true,
        ..Default::default()
    });
    assert_eq!(top_only, 1024 + 16);
}

#[test]
fn block_light_can_keep_lit_cave_faces() {
    let reg = Arc::new(BlockRegistry::builtin());
    let stone = block(&reg, "stone");
    let glow = block(&reg, "glowstone");
    let mut src = flat_world(&reg, -1, 2, "stone", 64);
    src.insert(chunk_from_fn(&reg, ChunkCoord::new(0, 0), 5, None, move |x, y, z| {
        let pocket = (20..23).contains(&y) && (4..8).contains(&x) && (4..8).contains(&z);
        if (x, y, z) == (5, 20, 5) {
            glow
        } else if y < 64 && !pocket {
            stone
        } else {
            Block::AIR
        }
    }));
    let src = Arc::new(src);
    let quads = |settings: RenderSettings| {
        let r = TileRenderer::new(src.clone(), reg.clone(), TileGrid::default(), settings);
        hires(&r.render_hires(TileCoord::hires(0, 0)).unwrap()).mesh.quad_count()
    };
    let sky_only = quads(RenderSettings {
        render_caves: false,
        ..Default::default()
    });
    assert_eq!(sky_only, 1024);
    // the glowstone's five open faces survive; unlit stone walls do not
    let with_block_light = quads(RenderSettings {
        render_caves: false,
        cave_detection_uses_block_light: true,
        ..Default::default()
    });
    assert_eq!(with_block_light, 1024 + 5);
}

#[test]
fn vertex_budget_is_enforced() {
    let reg = Arc::new(BlockRegistry::builtin());
    let r = renderer(
        &reg,
        flat_world(&reg, -1, 2, "stone", 64),
        RenderSettings {
            max_vertices: 100,
            ..Default::default()
        },
    );
    let err = r.render_hires(TileCoord::hires(0, 0)).unwrap_err();
    assert!(matches!(err, RenderError::Failure { tile, .. } if tile == TileCoord::hires(0, 0)));
}

#[test]
fn unreadable_halo_region_renders_as_absent_chunks() {
    let reg = Arc::new(BlockRegistry::builtin());
    let mut src = flat_world(&reg, -1, 2, "stone", 64);
    src.unavailable.insert(RegionCoord::new(-1, -1));
    let r = renderer(&reg, src, RenderSettings::default());
    let p = r.render_hires(TileCoord::hires(0, 0)).unwrap();

    // same output as if the corner chunk had never been generated
    let mut missing = flat_world(&reg, -1, 2, "stone", 64);
    missing.chunks.remove(&ChunkCoord::new(-1, -1));
    let expected = renderer(&reg, missing, RenderSettings::default())
        .render_hires(TileCoord::hires(0, 0))
        .unwrap();
    assert_eq!(p, expected);

    // a footprint inside the unreadable region still fails
    let err = r.render_hires(TileCoord::hires(-1, -1)).unwrap_err();
    assert!(matches!(err, RenderError::RegionUnavailable(e) if e.region == RegionCoord::new(-1, -1)));
}

#[test]
fn tiles_without_chunks_are_empty() {
    let reg = Arc::new(BlockRegistry::builtin());
    // chunk 2 is only in the halo of tile 0
    let mut src = MapSource::default();
    src.insert(flat_chunk(&reg, ChunkCoord::new(2, 0), "stone", 10));
    let r = renderer(&reg, src, RenderSettings::default());
    assert_eq!(r.render_hires(TileCoord::hires(0, 0)).unwrap(), TilePayload::Empty);
    assert_eq!(r.render_hires(TileCoord::hires(-5, 9)).unwrap(), TilePayload::Empty);
    assert!(!r.render_hires(TileCoord::hires(1, 0)).unwrap().is_empty());
    assert_eq!(r.render_lowres_from_chunks(TileCoord::new(-3, -3, 2)).unwrap(), TilePayload::Empty);
    let empties = vec![Some(TilePayload::Empty); 4];
    assert_eq!(r.render_lowres(TileCoord::new(0, 0, 1), &empties).unwrap(), TilePayload::Empty);
}

#[test]
fn placeholder_chunk_only_blanks_its_own_columns() {
    let reg = Arc::new(BlockRegistry::builtin());
    let mut src = flat_world(&reg, -1, 2, "stone", 64);
    src.insert(Chunk::empty(ChunkCoord::new(1, 0)));
    let r = renderer(&reg, src, RenderSettings::default());
    let p = r.render_hires(TileCoord::hires(0, 0)).unwrap();
    let cols = &hires(&p).columns;
    for z in 0..32 {
        for x in 0..32 {
            let blank = x >= 16 && z < 16;
            assert_eq!(cols.get(x, z).is_empty(), blank, "column {x},{z}");
        }
    }
}

#[test]
fn lowres_merges_children_and_samples_missing_ones() {
    let reg = Arc::new(BlockRegistry::builtin());
    let r = renderer(&reg, flat_world(&reg, -1, 4, "stone", 64), RenderSettings::default());
    let parent = TileCoord::new(0, 0, 1);
    let children: Vec<_> = r
        .grid()
        .children(parent)
        .into_iter()
        .map(|c| Some(r.render_hires(c).unwrap()))
        .collect();
    let merged = r.render_lowres(parent, &children).unwrap();
    let sampled = r.render_lowres_from_chunks(parent).unwrap();
    assert_eq!(merged, sampled);

    let TilePayload::Lowres(l) = &merged else {
        panic!("expected lowres payload");
    };
    let hires_px = children[0].as_ref().unwrap().columns().unwrap().get(0, 0);
    assert_eq!(l.columns.size(), 32);
    assert!(l.columns.pixels().iter().all(|p| *p == hires_px));

    // an empty child leaves its quadrant blank, a missing one is sampled
    let mixed = vec![children[0].clone(), Some(TilePayload::Empty), None, Some(TilePayload::Empty)];
    let TilePayload::Lowres(l) = r.render_lowres(parent, &mixed).unwrap() else {
        panic!("expected lowres payload");
    };
    assert!(!l.columns.get(0, 0).is_empty());
    assert!(l.columns.get(31, 0).is_empty());
    assert!(!l.columns.get(0, 31).is_empty());
    assert!(l.columns.get(31, 31).is_empty());

    let err = r.render_lowres(parent, &children[..3]).unwrap_err();
    assert!(matches!(err, RenderError::Failure { .. }));
}

#[test]
fn highest_mode_keeps_the_tallest_column() {
    let reg = Arc::new(BlockRegistry::builtin());
    let stone = block(&reg, "stone");
    let mut src = flat_world(&reg, -1, 4, "stone", 64);
    src.insert(chunk_from_fn(&reg, ChunkCoord::new(0, 0), 6, None, move |x, y, z| {
        if y < 64 || ((x, z) == (3, 3) && y < 90) { stone } else { Block::AIR }
    }));
    let settings = RenderSettings {
        lowres_resolution: 8,
        downsample: DownsampleMode::Highest,
        ..Default::default()
    };
    let r = renderer(&reg, src, settings);
    let parent = TileCoord::new(0, 0, 1);
    let children: Vec<_> = r
        .grid()
        .children(parent)
        .into_iter()
        .map(|c| Some(r.render_hires(c).unwrap()))
        .collect();
    let TilePayload::Lowres(l) = r.render_lowres(parent, &children).unwrap() else {
        panic!("expected lowres payload");
    };
    assert_eq!(l.columns.size(), 8);
    assert_eq!(l.columns.get(0, 0).height, 90);
    assert_eq!(l.columns.get(1, 0).height, 64);
}
