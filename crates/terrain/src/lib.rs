//! Terrain synthesis for exterior cells.
//!
//! Decodes a land record's cumulative height deltas and its 16×16 texture
//! index grid, then resolves ground textures to layer descriptors that are
//! shared across every cell using the same texture.
//!
//! # Invariants
//! - Height and weight arrays are always `65×65` and `16×16×layers`.
//! - Every splat texel has weight 1.0 on exactly one layer.
//! - A layer descriptor is created at most once per diffuse texture.

pub mod geometry;
pub mod heights;
pub mod layers;
pub mod splat;
pub mod synth;
pub mod textures;

pub use geometry::{GeometryBuilder, PlaceholderGeometryBuilder};
pub use heights::{HeightMap, decode_heights, decode_world_heights};
pub use layers::{LayerCache, LayerOptions, TerrainLayerDescriptor};
pub use splat::{SPLAT_SIZE, SplatMap, decode_splat};
pub use synth::{DecodedTerrain, TerrainConfig, TerrainRequest, TerrainSynthesizer, decode_land};
pub use textures::{MemoryTextureRegistry, TextureEntry, TextureHandle, TextureRegistry};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TerrainError {
    #[error("height grid has {actual} samples, expected {expected}")]
    HeightGridSize { expected: usize, actual: usize },
    #[error("texture index grid has {actual} entries, expected {expected}")]
    TextureGridSize { expected: usize, actual: usize },
}

pub fn crate_info() -> &'static str {
    "cellworld-terrain v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("terrain"));
    }
}
