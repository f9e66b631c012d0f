use serde::{Deserialize, Serialize};

/// How lowres tiles fold their children's column maps together.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownsampleMode {
    /// Alpha-weighted mean color, mean height.
    #[default]
    Average,
    /// The sample with the greatest height wins.
    Highest,
}

/// Knobs that change rendered output. Two renders with equal settings over
/// equal chunks produce identical payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub sea_level: i32,
    /// Strength of the height brightness gradient in the column map.
    pub height_shading: f32,
    /// Brightness floor for unlit surfaces, `0..=1`.
    pub ambient_light: f32,
    pub render_caves: bool,
    /// Block light also counts when deciding whether a face is in a cave.
    pub cave_detection_uses_block_light: bool,
    pub render_top_only: bool,
    /// Column map edge length of lowres tiles.
    pub lowres_resolution: u16,
    pub downsample: DownsampleMode,
    /// Hard cap on vertices per hires mesh.
    pub max_vertices: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            sea_level: 63,
            height_shading: 0.25,
            ambient_light: 0.1,
            render_caves: true,
            cave_detection_uses_block_light: false,
            render_top_only: false,
            lowres_resolution: 32,
            downsample: DownsampleMode::Average,
            max_vertices: 4_000_000,
        }
    }
}

impl RenderSettings {
    /// Brightness multiplier for a column whose top sits at `height`.
    #[inline]
    pub fn height_factor(&self, height: i32) -> f32 {
        let k = 1.0 + (height - self.sea_level) as f32 / 256.0 * self.height_shading;
        k.clamp(0.6, 1.25)
    }

    /// Maps a `0..=15` light level onto a brightness that never drops below
    /// the ambient floor.
    #[inline]
    pub fn light_factor(&self, level: u8) -> f32 {
        let ambient = self.ambient_light.clamp(0.0, 1.0);
        let light = f32::from(level.min(15)) / 15.0;
        (1.0 - ambient) * light + ambient
    }
}
