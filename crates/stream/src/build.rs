use std::sync::Arc;

use cellworld_common::Transform;
use cellworld_records::{CellRecord, WorldDatabase};
use cellworld_scene::Scene;
use cellworld_terrain::{
    DecodedTerrain, GeometryBuilder, MemoryTextureRegistry, PlaceholderGeometryBuilder,
    TerrainConfig, TerrainSynthesizer, TextureRegistry, decode_land,
};

use crate::cache::{CellKey, ResidentCell};
use crate::instantiate::{
    ContentInstantiator, ModelInstancer, PlaceholderModelInstancer, ResolvedReference,
    resolve_references,
};

/// Everything about a cell that can be worked out without the scene.
#[derive(Debug, Clone)]
pub struct PreparedCell {
    pub record: Arc<CellRecord>,
    pub terrain: Option<DecodedTerrain>,
    pub references: Vec<ResolvedReference>,
}

/// Decode land and resolve references for a cell. Runs on any thread.
///
/// Malformed land is logged and the cell is prepared without terrain.
pub fn prepare_cell(db: &dyn WorldDatabase, record: Arc<CellRecord>) -> PreparedCell {
    let terrain = if record.is_interior() {
        None
    } else {
        db.find_land(record.coord)
            .and_then(|land| match decode_land(&land) {
                Ok(decoded) => decoded,
                Err(err) => {
                    tracing::warn!(
                        coord = %record.coord,
                        %err,
                        "malformed land, building without terrain"
                    );
                    None
                }
            })
    };
    let references = resolve_references(db, &record);
    PreparedCell {
        record,
        terrain,
        references,
    }
}

/// Owns the collaborators that write into the scene and turns prepared cells
/// into [`ResidentCell`]s.
pub struct CellFactory {
    db: Arc<dyn WorldDatabase>,
    terrain: TerrainSynthesizer,
    textures: Box<dyn TextureRegistry>,
    geometry: Box<dyn GeometryBuilder>,
    content: ContentInstantiator,
    cell_side_length: f32,
}

impl CellFactory {
    pub fn new(
        db: Arc<dyn WorldDatabase>,
        terrain: TerrainConfig,
        textures: Box<dyn TextureRegistry>,
        geometry: Box<dyn GeometryBuilder>,
        models: Box<dyn ModelInstancer>,
    ) -> Self {
        Self {
            db,
            terrain: TerrainSynthesizer::new(terrain),
            textures,
            geometry,
            content: ContentInstantiator::new(models),
            cell_side_length: 8192.0,
        }
    }

    /// Factory backed by the in-memory texture registry and the placeholder
    /// geometry and model builders.
    pub fn placeholder(db: Arc<dyn WorldDatabase>, terrain: TerrainConfig) -> Self {
        Self::with_models(db, terrain, PlaceholderModelInstancer::new())
    }

    pub fn with_models(
        db: Arc<dyn WorldDatabase>,
        terrain: TerrainConfig,
        models: impl ModelInstancer + 'static,
    ) -> Self {
        Self::new(
            db,
            terrain,
            Box::new(MemoryTextureRegistry::new()),
            Box::new(PlaceholderGeometryBuilder::new()),
            Box::new(models),
        )
    }

    pub fn database(&self) -> &Arc<dyn WorldDatabase> {
        &self.db
    }

    pub fn synthesizer(&self) -> &TerrainSynthesizer {
        &self.terrain
    }

    pub fn cell_side_length(&self) -> f32 {
        self.cell_side_length
    }

    pub fn set_cell_side_length(&mut self, cell_side_length: f32) {
        self.cell_side_length = cell_side_length;
    }

    pub fn prepare(&self, record: Arc<CellRecord>) -> PreparedCell {
        prepare_cell(self.db.as_ref(), record)
    }

    /// Instantiate a prepared cell: root, terrain, objects container and
    /// every resolved reference.
    pub fn commit(&mut self, scene: &mut Scene, prepared: PreparedCell) -> ResidentCell {
        let key = CellKey::for_record(&prepared.record);
        let _span = tracing::debug_span!("commit_cell", %key).entered();

        let root = scene.spawn(key.as_str(), Transform::default());
        let terrain = prepared.terrain.map(|decoded| {
            let request = self.terrain.build_request(
                decoded,
                self.cell_side_length,
                self.db.as_ref(),
                self.textures.as_mut(),
            );
            let node = self.geometry.create_terrain(scene, &request);
            scene.set_parent(node, Some(root));
            node
        });

        let objects = scene.spawn_child(root, "objects", Transform::default());
        let placed = self.content.instantiate(
            scene,
            objects,
            &prepared.references,
            prepared.record.is_interior(),
        );
        tracing::trace!(
            placed,
            terrain = terrain.is_some(),
            "cell committed"
        );

        ResidentCell {
            key,
            root,
            objects,
            terrain,
            record: prepared.record,
        }
    }

    /// Prepare and commit on the calling thread.
    pub fn build(&mut self, scene: &mut Scene, record: Arc<CellRecord>) -> ResidentCell {
        let prepared = self.prepare(record);
        self.commit(scene, prepared)
    }
}
