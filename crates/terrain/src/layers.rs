use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::textures::{TextureHandle, TextureRegistry};

/// Surface parameters for one ground texture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainLayerDescriptor {
    pub diffuse: TextureHandle,
    pub normal_map: Option<TextureHandle>,
    pub mask: Option<TextureHandle>,
    /// World size covered by one repeat of the texture.
    pub tile_size: f32,
}

/// Options used when a new layer descriptor is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerOptions {
    pub generate_normal_maps: bool,
    pub normal_map_strength: f32,
    pub generate_masks: bool,
    pub tile_size: f32,
}

/// Process-wide layer descriptors keyed by diffuse texture.
///
/// Never evicts: two cells on the same ground texture share one descriptor
/// for as long as the cache lives.
#[derive(Debug, Default)]
pub struct LayerCache {
    layers: HashMap<TextureHandle, Arc<TerrainLayerDescriptor>>,
}

impl LayerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, texture: TextureHandle) -> Option<Arc<TerrainLayerDescriptor>> {
        self.layers.get(&texture).cloned()
    }

    pub fn get_or_create(
        &mut self,
        texture: TextureHandle,
        options: &LayerOptions,
        registry: &mut dyn TextureRegistry,
    ) -> Arc<TerrainLayerDescriptor> {
        if let Some(existing) = self.layers.get(&texture) {
            return Arc::clone(existing);
        }

        let normal_map = options
            .generate_normal_maps
            .then(|| registry.create_normal_map_texture(texture, options.normal_map_strength));
        let mask = options
            .generate_masks
            .then(|| registry.create_mask_texture(texture));

        let descriptor = Arc::new(TerrainLayerDescriptor {
            diffuse: texture,
            normal_map,
            mask,
            tile_size: options.tile_size,
        });
        tracing::trace!(?texture, "terrain layer created");
        self.layers.insert(texture, Arc::clone(&descriptor));
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::textures::MemoryTextureRegistry;

    fn options() -> LayerOptions {
        LayerOptions {
            generate_normal_maps: true,
            normal_map_strength: 1.5,
            generate_masks: false,
            tile_size: 6.0,
        }
    }

    #[test]
    fn descriptors_are_shared_per_texture() {
        let mut registry = MemoryTextureRegistry::new();
        let mut cache = LayerCache::new();
        let grass = registry.load("textures/tx_grass.dds");

        let a = cache.get_or_create(grass, &options(), &mut registry);
        let b = cache.get_or_create(grass, &options(), &mut registry);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn derived_textures_generated_once() {
        let mut registry = MemoryTextureRegistry::new();
        let mut cache = LayerCache::new();
        let rock = registry.load("textures/tx_rock.dds");

        let layer = cache.get_or_create(rock, &options(), &mut registry);
        assert!(layer.normal_map.is_some());
        assert!(layer.mask.is_none());
        let requests = registry.request_count();

        cache.get_or_create(rock, &options(), &mut registry);
        assert_eq!(registry.request_count(), requests);
    }
}
