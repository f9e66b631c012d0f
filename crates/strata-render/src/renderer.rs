use std::borrow::Cow;
use std::sync::Arc;

use log::{debug, trace};
use strata_blocks::BlockRegistry;
use strata_chunk::ChunkSource;

use crate::columns::{ColumnMap, ColumnShader, downsample};
use crate::error::RenderError;
use crate::hires::mesh_tile;
use crate::neighborhood::Neighborhood;
use crate::payload::{HiresTile, LowresTile, TilePayload};
use crate::settings::RenderSettings;
use crate::tile::{TileCoord, TileGrid};

/// Turns chunks into tile payloads. Holds no mutable state; one instance is
/// shared by every worker.
pub struct TileRenderer {
    source: Arc<dyn ChunkSource>,
    registry: Arc<BlockRegistry>,
    grid: TileGrid,
    settings: RenderSettings,
}

impl TileRenderer {
    pub fn new(
        source: Arc<dyn ChunkSource>,
        registry: Arc<BlockRegistry>,
        grid: TileGrid,
        settings: RenderSettings,
    ) -> Self {
        TileRenderer {
            source,
            registry,
            grid,
            settings,
        }
    }

    #[inline]
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    #[inline]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn render_hires(&self, tile: TileCoord) -> Result<TilePayload, RenderError> {
        if !tile.is_hires() {
            return Err(RenderError::failure(tile, "not a hires tile"));
        }
        let fp = self.grid.footprint(tile);
        let hood = Neighborhood::load(self.source.as_ref(), fp)?;
        if !hood.any_present(fp) {
            trace!(target: "render", "tile {tile}: no chunks");
            return Ok(TilePayload::Empty);
        }
        let mesh = mesh_tile(tile, &hood, &self.registry, &self.settings, fp)?;
        let columns = ColumnShader::new(&self.registry, &self.settings).hires(&hood, fp);
        debug!(
            target: "render",
            "tile {tile}: {} quads, {} vertices",
            mesh.quad_count(),
            mesh.vertex_count()
        );
        Ok(TilePayload::Hires(HiresTile { mesh, columns }))
    }

    /// Aggregates a lowres tile from its children, given in the order of
    /// `TileGrid::children`. `None` marks a child that could not be read;
    /// its area is sampled from chunks instead.
    pub fn render_lowres(
        &self,
        tile: TileCoord,
        children: &[Option<TilePayload>],
    ) -> Result<TilePayload, RenderError> {
        if tile.is_hires() {
            return Err(RenderError::failure(tile, "not a lowres tile"));
        }
        let coords = self.grid.children(tile);
        if children.len() != coords.len() {
            return Err(RenderError::failure(
                tile,
                format!("expected {} children, got {}", coords.len(), children.len()),
            ));
        }
        let n = self.grid.lod_factor as usize;
        let size = self.settings.lowres_resolution.max(1);
        let fallback_size = (size / n as u16).max(1);
        let shader = ColumnShader::new(&self.registry, &self.settings);

        let mut maps: Vec<Option<Cow<'_, ColumnMap>>> = Vec::with_capacity(children.len());
        let mut sampled = 0usize;
        for (coord, child) in coords.iter().zip(children) {
            let map = match child {
                Some(p) => p.columns().map(Cow::Borrowed),
                None => {
                    sampled += 1;
                    let fp = self.grid.footprint(*coord);
                    let m = shader.sample(self.source.as_ref(), fp, fallback_size)?;
                    (!m.is_empty()).then_some(Cow::Owned(m))
                }
            };
            maps.push(map);
        }
        if maps.iter().all(Option::is_none) {
            trace!(target: "render", "tile {tile}: all children empty");
            return Ok(TilePayload::Empty);
        }
        let refs: Vec<Option<&ColumnMap>> = maps.iter().map(|m| m.as_deref()).collect();
        let columns = downsample(&refs, n, size, self.settings.downsample);
        if columns.is_empty() {
            return Ok(TilePayload::Empty);
        }
        debug!(target: "render", "tile {tile}: merged {} children ({sampled} sampled)", children.len());
        Ok(TilePayload::Lowres(LowresTile { columns }))
    }

    /// Lowres tile built only from chunk samples.
    pub fn render_lowres_from_chunks(&self, tile: TileCoord) -> Result<TilePayload, RenderError> {
        let none = vec![None; self.grid.children(tile).len()];
        self.render_lowres(tile, &none)
    }

    /// Dispatches on the tile's level.
    pub fn render(
        &self,
        tile: TileCoord,
        children: &[Option<TilePayload>],
    ) -> Result<TilePayload, RenderError> {
        if tile.is_hires() {
            self.render_hires(tile)
        } else {
            self.render_lowres(tile, children)
        }
    }
}
