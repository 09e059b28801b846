use std::sync::Arc;

use cellworld_common::{CellCoord, LAND_GRID_SIZE};
use cellworld_records::{LandRecord, WorldDatabase};
use glam::Vec3;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::TerrainError;
use crate::heights::{HeightMap, decode_heights};
use crate::layers::{LayerCache, LayerOptions, TerrainLayerDescriptor};
use crate::splat::{SplatMap, decode_splat};
use crate::textures::TextureRegistry;

/// Terrain synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Texture used where a land record has no texture override.
    pub default_texture: String,
    pub generate_normal_maps: bool,
    pub normal_map_strength: f32,
    pub generate_masks: bool,
    /// World size covered by one repeat of a ground texture.
    pub layer_tile_size: f32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            default_texture: "textures/_land_default.dds".into(),
            generate_normal_maps: false,
            normal_map_strength: 1.0,
            generate_masks: false,
            layer_tile_size: 512.0,
        }
    }
}

impl TerrainConfig {
    fn layer_options(&self) -> LayerOptions {
        LayerOptions {
            generate_normal_maps: self.generate_normal_maps,
            normal_map_strength: self.normal_map_strength,
            generate_masks: self.generate_masks,
            tile_size: self.layer_tile_size,
        }
    }
}

/// Land data decoded without touching textures or the scene. Safe to produce
/// on a worker thread.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTerrain {
    pub coord: CellCoord,
    pub heights: HeightMap,
    pub splat: SplatMap,
}

/// Decode a land record. `Ok(None)` when the record has no height data.
pub fn decode_land(land: &LandRecord) -> Result<Option<DecodedTerrain>, TerrainError> {
    let Some(field) = &land.heights else {
        tracing::trace!(coord = %land.coord, "land has no height data");
        return Ok(None);
    };
    let heights = decode_heights(field)?;
    let splat = decode_splat(land.texture_indices.as_deref())?;
    Ok(Some(DecodedTerrain {
        coord: land.coord,
        heights,
        splat,
    }))
}

/// Everything the geometry builder needs to create one cell's terrain.
#[derive(Debug, Clone)]
pub struct TerrainRequest {
    pub coord: CellCoord,
    /// Normalized heights, `[[row, column]]`.
    pub heights: Array2<f32>,
    pub height_range: f32,
    pub min_height: f32,
    /// World distance between adjacent height samples.
    pub sample_spacing: f32,
    pub layers: Vec<Arc<TerrainLayerDescriptor>>,
    /// `(16, 16, layers.len())` one-hot blend weights.
    pub weights: Array3<f32>,
    /// Cell corner at the lowest height.
    pub world_position: Vec3,
}

/// Turns land records into terrain requests, sharing layer descriptors
/// across cells through its [`LayerCache`].
#[derive(Debug)]
pub struct TerrainSynthesizer {
    config: TerrainConfig,
    layers: LayerCache,
}

impl TerrainSynthesizer {
    pub fn new(config: TerrainConfig) -> Self {
        Self::with_layer_cache(config, LayerCache::new())
    }

    pub fn with_layer_cache(config: TerrainConfig, layers: LayerCache) -> Self {
        Self { config, layers }
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn layer_cache(&self) -> &LayerCache {
        &self.layers
    }

    /// Resolve stored texture indices to shared layer descriptors, in order.
    pub fn resolve_layers(
        &mut self,
        indices: &[i32],
        db: &dyn WorldDatabase,
        registry: &mut dyn TextureRegistry,
    ) -> Vec<Arc<TerrainLayerDescriptor>> {
        let options = self.config.layer_options();
        let mut layers = Vec::with_capacity(indices.len());
        for &index in indices {
            let path = self.texture_path(index, db);
            let texture = registry.load(&path);
            layers.push(self.layers.get_or_create(texture, &options, registry));
        }
        layers
    }

    fn texture_path(&self, index: i32, db: &dyn WorldDatabase) -> String {
        if index < 0 {
            return self.config.default_texture.clone();
        }
        let found = u16::try_from(index)
            .ok()
            .and_then(|i| db.find_land_texture(i));
        match found {
            Some(texture) => texture.path,
            None => {
                tracing::warn!(index, "unknown land texture, using default");
                self.config.default_texture.clone()
            }
        }
    }

    /// Attach textures to decoded land and lay it out in world space.
    pub fn build_request(
        &mut self,
        decoded: DecodedTerrain,
        cell_side_length: f32,
        db: &dyn WorldDatabase,
        registry: &mut dyn TextureRegistry,
    ) -> TerrainRequest {
        let layers = self.resolve_layers(&decoded.splat.layers, db, registry);
        let coord = decoded.coord;
        TerrainRequest {
            coord,
            heights: decoded.heights.normalized,
            height_range: decoded.heights.range,
            min_height: decoded.heights.min,
            sample_spacing: cell_side_length / (LAND_GRID_SIZE - 1) as f32,
            layers,
            weights: decoded.splat.weights,
            world_position: Vec3::new(
                coord.x as f32 * cell_side_length,
                decoded.heights.min,
                coord.z as f32 * cell_side_length,
            ),
        }
    }

    /// Decode and build in one step. `Ok(None)` when there is no height data.
    pub fn synthesize(
        &mut self,
        land: &LandRecord,
        cell_side_length: f32,
        db: &dyn WorldDatabase,
        registry: &mut dyn TextureRegistry,
    ) -> Result<Option<TerrainRequest>, TerrainError> {
        let Some(decoded) = decode_land(land)? else {
            return Ok(None);
        };
        Ok(Some(self.build_request(decoded, cell_side_length, db, registry)))
    }
}
