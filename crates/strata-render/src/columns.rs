//! Top-down column maps: one colored, height-tagged pixel per sample.
//!
//! Hires tiles carry a map with one pixel per block column. Lowres tiles are
//! nothing but a column map, built from their children's maps or, when a
//! child is missing, sampled straight from chunks.

use std::collections::HashMap;
use std::sync::Arc;

use strata_blocks::types::STATE_WATERLOGGED;
use strata_blocks::{BiomeId, BlockId, BlockRegistry, BlockType, RenderKind};
use strata_chunk::{CHUNK_WIDTH, Chunk, ChunkCoord, ChunkSource, RegionUnavailable};
use strata_geom::Color;

use crate::neighborhood::Neighborhood;
use crate::settings::{DownsampleMode, RenderSettings};
use crate::tile::Footprint;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColumnPixel {
    pub color: [u8; 4],
    /// First air y above the sampled top block.
    pub height: i16,
}

impl ColumnPixel {
    pub const EMPTY: ColumnPixel = ColumnPixel {
        color: [0; 4],
        height: i16::MIN,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.color[3] == 0
    }
}

/// Square grid of pixels, row-major (z, x).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMap {
    size: u16,
    pixels: Vec<ColumnPixel>,
}

impl ColumnMap {
    pub fn empty(size: u16) -> Self {
        ColumnMap {
            size,
            pixels: vec![ColumnPixel::EMPTY; size as usize * size as usize],
        }
    }

    /// `None` when the pixel count does not match `size²`.
    pub fn from_pixels(size: u16, pixels: Vec<ColumnPixel>) -> Option<Self> {
        (pixels.len() == size as usize * size as usize).then_some(ColumnMap { size, pixels })
    }

    #[inline]
    pub fn size(&self) -> u16 {
        self.size
    }

    #[inline]
    pub fn get(&self, x: usize, z: usize) -> ColumnPixel {
        self.pixels[z * self.size as usize + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, z: usize, p: ColumnPixel) {
        let s = self.size as usize;
        self.pixels[z * s + x] = p;
    }

    pub fn pixels(&self) -> &[ColumnPixel] {
        &self.pixels
    }

    /// True when no pixel carries color.
    pub fn is_empty(&self) -> bool {
        self.pixels.iter().all(ColumnPixel::is_empty)
    }
}

/// Block color with the biome tint applied.
pub(crate) fn block_color(registry: &BlockRegistry, ty: &BlockType, biome: Option<BiomeId>) -> Color {
    let base = Color::from_rgba8(ty.color);
    let biome = registry.biome(biome.unwrap_or(registry.default_biome_id()));
    match biome.tint(ty.tint) {
        Some(t) => base.tinted(Color::from_rgba8(t)),
        None => base,
    }
}

/// Resolves the top of a column into a map pixel.
pub struct ColumnShader<'a> {
    registry: &'a BlockRegistry,
    settings: &'a RenderSettings,
    water: Option<BlockId>,
}

impl<'a> ColumnShader<'a> {
    pub fn new(registry: &'a BlockRegistry, settings: &'a RenderSettings) -> Self {
        ColumnShader {
            registry,
            settings,
            water: registry.id_by_name("water"),
        }
    }

    /// Walks down from the surface compositing translucent layers front to
    /// back until something opaque is hit.
    pub fn pixel(&self, chunk: &Chunk, x: usize, z: usize) -> ColumnPixel {
        if chunk.is_empty() {
            return ColumnPixel::EMPTY;
        }
        let mut acc = Layers::default();
        let mut top = None;
        let mut y = chunk.surface_height(x, z).min(chunk.max_y()) - 1;
        while y >= chunk.min_y() && !acc.is_opaque() {
            let b = chunk.block(x, y, z);
            let ty = self.registry.block(b.id);
            let biome = chunk.biome(x, y, z);
            if let Some(water) = self.water.filter(|w| *w != b.id && b.has_flag(STATE_WATERLOGGED)) {
                top.get_or_insert(y + 1);
                acc.push(block_color(self.registry, self.registry.block(water), biome));
            }
            if ty.is_drawn() {
                top.get_or_insert(y + 1);
                let mut c = block_color(self.registry, ty, biome);
                if !matches!(ty.kind, RenderKind::Translucent | RenderKind::Liquid) {
                    c.a = 1.0;
                }
                acc.push(c);
            }
            y -= 1;
        }
        let Some(height) = top else {
            return ColumnPixel::EMPTY;
        };
        let Some(color) = acc.resolve() else {
            return ColumnPixel::EMPTY;
        };
        let sky = chunk.sky_light(x, height, z).unwrap_or(15);
        let block = chunk.block_light(x, height, z).unwrap_or(0);
        let k = self.settings.light_factor(sky.max(block)) * self.settings.height_factor(height);
        ColumnPixel {
            color: color.scaled(k).to_rgba8(),
            height: height.clamp(i16::MIN as i32 + 1, i16::MAX as i32) as i16,
        }
    }

    /// One pixel per block column of `fp`.
    pub fn hires(&self, hood: &Neighborhood, fp: Footprint) -> ColumnMap {
        let size = fp.width() as u16;
        let mut map = ColumnMap::empty(size);
        for wz in fp.min_z..fp.max_z {
            for wx in fp.min_x..fp.max_x {
                if let Some((chunk, x, z)) = hood.column(wx, wz) {
                    map.set(
                        (wx - fp.min_x) as usize,
                        (wz - fp.min_z) as usize,
                        self.pixel(chunk, x, z),
                    );
                }
            }
        }
        map
    }

    /// Coarse map of `fp` at `size` pixels per edge, each pixel taken from the
    /// column under its center.
    pub fn sample(
        &self,
        source: &dyn ChunkSource,
        fp: Footprint,
        size: u16,
    ) -> Result<ColumnMap, RegionUnavailable> {
        let mut map = ColumnMap::empty(size);
        let mut loaded: HashMap<ChunkCoord, Arc<Chunk>> = HashMap::new();
        let cell = fp.width() as f64 / size as f64;
        for pz in 0..size as usize {
            let wz = fp.min_z + ((pz as f64 + 0.5) * cell).floor() as i32;
            for px in 0..size as usize {
                let wx = fp.min_x + ((px as f64 + 0.5) * cell).floor() as i32;
                let coord = ChunkCoord::containing(wx, wz);
                let chunk = match loaded.get(&coord) {
                    Some(c) => c.clone(),
                    None => {
                        let c = source.load(coord)?;
                        loaded.insert(coord, c.clone());
                        c
                    }
                };
                let p = self.pixel(
                    &chunk,
                    wx.rem_euclid(CHUNK_WIDTH) as usize,
                    wz.rem_euclid(CHUNK_WIDTH) as usize,
                );
                map.set(px, pz, p);
            }
        }
        Ok(map)
    }
}

/// Front-to-back compositing with premultiplied accumulation.
#[derive(Default)]
struct Layers {
    r: f32,
    g: f32,
    b: f32,
    a: f32,
}

impl Layers {
    #[inline]
    fn is_opaque(&self) -> bool {
        self.a >= 0.999
    }

    fn push(&mut self, c: Color) {
        let w = (1.0 - self.a) * c.a;
        self.r += w * c.r;
        self.g += w * c.g;
        self.b += w * c.b;
        self.a += w;
    }

    fn resolve(&self) -> Option<Color> {
        if self.a <= 0.0 {
            return None;
        }
        Some(Color::new(
            self.r / self.a,
            self.g / self.a,
            self.b / self.a,
            self.a.min(1.0),
        ))
    }
}

#[derive(Default)]
struct Merge {
    weight: f64,
    alpha: f64,
    rgb: [f64; 3],
    height: f64,
    best: Option<ColumnPixel>,
}

impl Merge {
    fn add(&mut self, p: ColumnPixel, w: f64, mode: DownsampleMode) {
        if p.is_empty() || w <= 0.0 {
            return;
        }
        match mode {
            DownsampleMode::Average => {
                let a = f64::from(p.color[3]) / 255.0;
                self.weight += w;
                self.alpha += w * a;
                for (acc, c) in self.rgb.iter_mut().zip(p.color) {
                    *acc += w * a * f64::from(c);
                }
                self.height += w * f64::from(p.height);
            }
            DownsampleMode::Highest => {
                if self.best.is_none_or(|b| p.height > b.height) {
                    self.best = Some(p);
                }
            }
        }
    }

    fn finish(&self, mode: DownsampleMode) -> ColumnPixel {
        match mode {
            DownsampleMode::Highest => self.best.unwrap_or(ColumnPixel::EMPTY),
            DownsampleMode::Average => {
                if self.weight <= 0.0 || self.alpha <= 0.0 {
                    return ColumnPixel::EMPTY;
                }
                let ch = |v: f64| (v / self.alpha).round().clamp(0.0, 255.0) as u8;
                let a = (self.alpha / self.weight * 255.0).round().clamp(1.0, 255.0) as u8;
                ColumnPixel {
                    color: [ch(self.rgb[0]), ch(self.rgb[1]), ch(self.rgb[2]), a],
                    height: (self.height / self.weight).round() as i16,
                }
            }
        }
    }
}

/// Merges an `n`×`n` grid of child maps (row-major, `None` = empty child)
/// into one map of `size` pixels per edge. Each output pixel takes every
/// child pixel it overlaps, weighted by overlap area.
pub fn downsample(children: &[Option<&ColumnMap>], n: usize, size: u16, mode: DownsampleMode) -> ColumnMap {
    let mut out = ColumnMap::empty(size);
    // parent tile spans [0, 1) on both axes
    let cell = 1.0 / size as f64;
    let child_w = 1.0 / n as f64;
    for pz in 0..size as usize {
        let (z0, z1) = (pz as f64 * cell, (pz + 1) as f64 * cell);
        for px in 0..size as usize {
            let (x0, x1) = (px as f64 * cell, (px + 1) as f64 * cell);
            let mut merge = Merge::default();
            let cz_hi = ((z1 / child_w).ceil() as usize).min(n);
            let cx_hi = ((x1 / child_w).ceil() as usize).min(n);
            for cz in (z0 / child_w).floor() as usize..cz_hi {
                for cx in (x0 / child_w).floor() as usize..cx_hi {
                    let Some(map) = children.get(cz * n + cx).copied().flatten() else {
                        continue;
                    };
                    let (ox, oz) = (cx as f64 * child_w, cz as f64 * child_w);
                    let span = Span::new(x0 - ox, x1 - ox, child_w, map.size());
                    let zspan = Span::new(z0 - oz, z1 - oz, child_w, map.size());
                    for j in zspan.first..zspan.last {
                        let wz = zspan.overlap(j);
                        for i in span.first..span.last {
                            merge.add(map.get(i, j), span.overlap(i) * wz, mode);
                        }
                    }
                }
            }
            out.set(px, pz, merge.finish(mode));
        }
    }
    out
}

/// A clipped interval over one axis of a child map.
struct Span {
    lo: f64,
    hi: f64,
    pix: f64,
    first: usize,
    last: usize,
}

impl Span {
    fn new(lo: f64, hi: f64, child_w: f64, size: u16) -> Self {
        let lo = lo.max(0.0);
        let hi = hi.min(child_w);
        let pix = child_w / size as f64;
        let first = (lo / pix).floor() as usize;
        let last = ((hi / pix).ceil() as usize).min(size as usize);
        Span {
            lo,
            hi,
            pix,
            first: first.min(last),
            last,
        }
    }

    #[inline]
    fn overlap(&self, i: usize) -> f64 {
        let a = (i as f64 * self.pix).max(self.lo);
        let b = ((i + 1) as f64 * self.pix).min(self.hi);
        (b - a).max(0.0)
    }
}
