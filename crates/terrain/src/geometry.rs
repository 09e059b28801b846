use cellworld_common::{NodeId, Transform};
use cellworld_scene::{Collider, Scene};

use crate::synth::TerrainRequest;

/// Turns a terrain request into scene geometry. Rasterization and GPU upload
/// live behind this trait.
pub trait GeometryBuilder {
    /// Create the terrain node at `request.world_position` and return it.
    fn create_terrain(&mut self, scene: &mut Scene, request: &TerrainRequest) -> NodeId;
}

/// Geometry builder that spawns a marker node with a heightfield collider.
///
/// Stand-in for a GPU terrain backend so the streamer can run headless.
#[derive(Debug, Default)]
pub struct PlaceholderGeometryBuilder {
    built: usize,
}

impl PlaceholderGeometryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terrain nodes created so far.
    pub fn built(&self) -> usize {
        self.built
    }
}

impl GeometryBuilder for PlaceholderGeometryBuilder {
    fn create_terrain(&mut self, scene: &mut Scene, request: &TerrainRequest) -> NodeId {
        self.built += 1;
        let (rows, cols) = request.heights.dim();
        let id = scene.spawn(
            "terrain",
            Transform::from_position(request.world_position),
        );
        scene.set_collider(id, Collider::Heightfield { rows, cols });
        id
    }
}
