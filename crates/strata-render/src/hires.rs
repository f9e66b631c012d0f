use strata_blocks::BlockRegistry;
use strata_geom::Vec3;

use crate::columns::block_color;
use crate::error::RenderError;
use crate::face::Face;
use crate::mesh::TileMesh;
use crate::neighborhood::{Light, Neighborhood};
use crate::settings::RenderSettings;
use crate::tile::{Footprint, TileCoord};

const AO_STEP: f32 = 0.25;

/// Emits one quad per visible block face inside `fp`. Iteration is chunk
/// row-major, then section, y, z, x, so output order is fixed.
pub fn mesh_tile(
    tile: TileCoord,
    hood: &Neighborhood,
    registry: &BlockRegistry,
    settings: &RenderSettings,
    fp: Footprint,
) -> Result<TileMesh, RenderError> {
    let mut mesh = TileMesh::default();
    let budget = settings.max_vertices as usize;
    for coord in fp.chunks() {
        let Some(chunk) = hood.chunk(coord) else {
            continue;
        };
        if chunk.is_empty() {
            continue;
        }
        let (ox, oz) = coord.block_origin();
        for section in chunk.sections() {
            if section.blocks.is_all_air() {
                continue;
            }
            for ly in 0..16 {
                let y = section.y * 16 + ly as i32;
                for lz in 0..16 {
                    for lx in 0..16 {
                        let b = section.blocks.get(lx, ly, lz);
                        let ty = registry.block(b.id);
                        if !ty.is_drawn() {
                            continue;
                        }
                        let (wx, wz) = (ox + lx as i32, oz + lz as i32);
                        let own = hood.light(wx, y, wz);
                        let mut color = None;
                        for face in Face::ALL {
                            if settings.render_top_only && face != Face::PosY {
                                continue;
                            }
                            let (dx, dy, dz) = face.delta();
                            let (nx, ny, nz) = (wx + dx, y + dy, wz + dz);
                            if hood.below_floor(nx, ny, nz) {
                                continue;
                            }
                            let neighbor = registry.block(hood.block(nx, ny, nz).id);
                            if ty.face_hidden_by(neighbor) {
                                continue;
                            }
                            let mut light = own.max(hood.light(nx, ny, nz));
                            light.block = light.block.max(ty.emission);
                            if !settings.render_caves && in_cave(hood, settings, light, (wx, y, wz)) {
                                continue;
                            }
                            if mesh.vertex_count() + 4 > budget {
                                return Err(RenderError::failure(
                                    tile,
                                    format!("mesh exceeds {budget} vertices"),
                                ));
                            }
                            let base = *color.get_or_insert_with(|| {
                                block_color(registry, ty, hood.biome(wx, y, wz))
                            });
                            let rgba = base.scaled(face.shade()).to_rgba8();
                            let ao = corner_ao(hood, registry, face, (nx, ny, nz));
                            let origin = Vec3::new(
                                (wx - fp.min_x) as f32,
                                y as f32,
                                (wz - fp.min_z) as f32,
                            );
                            mesh.add_face(face, origin, rgba, light.packed(), ao);
                        }
                    }
                }
            }
        }
    }
    Ok(mesh)
}

/// Unlit and under the column's surface. Only sky light counts unless
/// block light is enabled for cave detection.
#[inline]
fn in_cave(hood: &Neighborhood, settings: &RenderSettings, light: Light, (wx, y, wz): (i32, i32, i32)) -> bool {
    let level = if settings.cave_detection_uses_block_light {
        light.level()
    } else {
        light.sky
    };
    level == 0 && y < hood.surface(wx, wz)
}

/// Occlusion per face corner from the three blocks around it on the outer
/// layer. Both sides occluding darkens fully regardless of the diagonal.
fn corner_ao(hood: &Neighborhood, registry: &BlockRegistry, face: Face, out: (i32, i32, i32)) -> [u8; 4] {
    let occludes = |(x, y, z): (i32, i32, i32)| registry.block(hood.block(x, y, z).id).occluding;
    let [t1, t2] = face.tangents();
    face.corners().map(|corner| {
        let s1 = side(corner, t1);
        let s2 = side(corner, t2);
        let a = occludes(offset(out, t1, s1, t2, 0));
        let b = occludes(offset(out, t1, 0, t2, s2));
        let n = if a && b {
            3
        } else {
            a as u32 + b as u32 + occludes(offset(out, t1, s1, t2, s2)) as u32
        };
        ((1.0 - AO_STEP * n as f32) * 255.0).round() as u8
    })
}

/// `+1` when the corner sits on the positive end of axis `t`, else `-1`.
#[inline]
fn side(corner: (i32, i32, i32), t: (i32, i32, i32)) -> i32 {
    let c = corner.0 * t.0 + corner.1 * t.1 + corner.2 * t.2;
    2 * c - 1
}

#[inline]
fn offset(p: (i32, i32, i32), t1: (i32, i32, i32), s1: i32, t2: (i32, i32, i32), s2: i32) -> (i32, i32, i32) {
    (
        p.0 + t1.0 * s1 + t2.0 * s2,
        p.1 + t1.1 * s1 + t2.1 * s2,
        p.2 + t1.2 * s1 + t2.2 * s2,
    )
}
