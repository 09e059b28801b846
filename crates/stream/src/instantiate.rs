//! Places a cell's references into the scene.
//!
//! Source records are Z-up; the scene is Y-up. Positions swap Y and Z and the
//! Euler angles are re-targeted to the swapped axes.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use cellworld_common::{NodeId, Transform};
use cellworld_records::{CellRecord, LightData, Record, ReferenceEntry, WorldDatabase};
use cellworld_scene::{Collider, LightSource, ObjectTag, Scene};
use glam::{EulerRot, Quat, Vec3};

/// Name of the node a model exposes for light placement.
pub const ATTACH_LIGHT_NODE: &str = "AttachLight";

/// Loads a model file into the scene as a detached subtree.
pub trait ModelInstancer {
    /// Spawn the model and return its root, or `None` if it cannot be loaded.
    fn instantiate(&mut self, scene: &mut Scene, path: &str) -> Option<NodeId>;
}

/// Model instancer that spawns a small marker hierarchy per model:
/// `root → mesh → collision`, with the collider on the innermost node.
///
/// Individual paths can be configured to expose an [`ATTACH_LIGHT_NODE`], to
/// carry no collider, or to fail loading.
#[derive(Debug, Default)]
pub struct PlaceholderModelInstancer {
    attach_lights: BTreeSet<String>,
    non_colliding: BTreeSet<String>,
    missing: BTreeSet<String>,
    instantiated: usize,
}

impl PlaceholderModelInstancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attach_light(mut self, path: &str) -> Self {
        self.attach_lights.insert(path.to_ascii_lowercase());
        self
    }

    pub fn without_collider(mut self, path: &str) -> Self {
        self.non_colliding.insert(path.to_ascii_lowercase());
        self
    }

    pub fn with_missing(mut self, path: &str) -> Self {
        self.missing.insert(path.to_ascii_lowercase());
        self
    }

    /// Models spawned so far.
    pub fn instantiated(&self) -> usize {
        self.instantiated
    }
}

impl ModelInstancer for PlaceholderModelInstancer {
    fn instantiate(&mut self, scene: &mut Scene, path: &str) -> Option<NodeId> {
        let key = path.to_ascii_lowercase();
        if self.missing.contains(&key) {
            return None;
        }
        self.instantiated += 1;

        let name = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(path);
        let root = scene.spawn(name, Transform::default());
        let mesh = scene.spawn_child(root, "mesh", Transform::default());
        if !self.non_colliding.contains(&key) {
            let collision = scene.spawn_child(mesh, "collision", Transform::default());
            scene.set_collider(collision, Collider::Mesh { source: key.clone() });
        }
        if self.attach_lights.contains(&key) {
            scene.spawn_child(
                root,
                ATTACH_LIGHT_NODE,
                Transform::from_position(Vec3::new(0.0, 0.5, 0.0)),
            );
        }
        Some(root)
    }
}

/// A reference whose target record has been found.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReference {
    pub entry: ReferenceEntry,
    pub record: Arc<Record>,
    pub model: Option<String>,
}

/// Resolve every reference of a cell, skipping (and logging) the ones whose
/// target is unknown. Reference order is preserved.
pub fn resolve_references(db: &dyn WorldDatabase, cell: &CellRecord) -> Vec<ResolvedReference> {
    cell.references
        .iter()
        .filter_map(|entry| match db.find_record(&entry.target) {
            Some(record) => Some(ResolvedReference {
                entry: entry.clone(),
                model: record.model.clone(),
                record,
            }),
            None => {
                tracing::warn!(
                    cell = %cell.name,
                    coord = %cell.coord,
                    target = %entry.target,
                    "unresolved reference"
                );
                None
            }
        })
        .collect()
}

/// Convert a Z-up source position into the Y-up scene.
pub fn source_position(position: Vec3) -> Vec3 {
    Vec3::new(position.x, position.z, position.y)
}

/// Convert source Euler angles `(rx, ry, rz)` into a scene rotation:
/// `rz` about world Y, `rx` about world X, `ry` about world Z, applied Z
/// first, then X, then Y.
pub fn source_rotation(rotation: Vec3) -> Quat {
    Quat::from_euler(EulerRot::YXZ, rotation.z, rotation.x, rotation.y)
}

/// Scene-space local transform of a reference.
pub fn reference_transform(entry: &ReferenceEntry) -> Transform {
    Transform {
        position: source_position(entry.position),
        rotation: source_rotation(entry.rotation),
        scale: entry.scale.map_or(Vec3::ONE, Vec3::splat),
    }
}

fn light_source(data: &LightData, indoors: bool) -> LightSource {
    LightSource {
        radius: data.radius,
        color: data.color.map(|c| f32::from(c) / 255.0),
        flicker: data.flicker,
        indoors,
    }
}

/// Instantiates resolved references under a cell's objects container.
pub struct ContentInstantiator {
    models: Box<dyn ModelInstancer>,
}

impl ContentInstantiator {
    pub fn new(models: Box<dyn ModelInstancer>) -> Self {
        Self { models }
    }

    /// Place every reference. Returns the number of top-level nodes created.
    pub fn instantiate(
        &mut self,
        scene: &mut Scene,
        objects: NodeId,
        references: &[ResolvedReference],
        indoors: bool,
    ) -> usize {
        let mut placed = 0;
        for reference in references {
            let transform = reference_transform(&reference.entry);

            let model = reference.model.as_deref().and_then(|path| {
                let node = self.models.instantiate(scene, path);
                if node.is_none() {
                    tracing::warn!(path, target = %reference.record.id, "model failed to load");
                }
                node
            });

            if let Some(node) = model {
                scene.set_parent(node, Some(objects));
                scene.set_transform(node, transform);
                tag_object(scene, objects, node, reference);
                placed += 1;
            }

            if let Some(data) = reference.record.light() {
                let light = light_source(data, indoors);
                let node = match model {
                    Some(model) => {
                        let anchor = scene
                            .find_descendant(model, ATTACH_LIGHT_NODE)
                            .unwrap_or(model);
                        scene.spawn_child(anchor, "light", Transform::default())
                    }
                    None => {
                        placed += 1;
                        scene.spawn_child(objects, "light", transform)
                    }
                };
                scene.set_light(node, light);
            }
        }
        placed
    }
}

/// Tag the object a model represents.
///
/// The tag lands on the topmost ancestor, below `objects`, of the first node
/// in the model carrying a collider. Models without a collider stay untagged.
fn tag_object(scene: &mut Scene, objects: NodeId, model: NodeId, reference: &ResolvedReference) {
    let Some(category) = reference.record.data.category() else {
        return;
    };
    let collider = scene
        .descendants(model)
        .into_iter()
        .find(|id| scene.get(*id).is_some_and(|n| n.collider.is_some()));
    let Some(collider) = collider else {
        tracing::trace!(target = %reference.record.id, "no collider, object left untagged");
        return;
    };

    let mut target = collider;
    for ancestor in scene.ancestors(collider) {
        if ancestor == objects {
            break;
        }
        target = ancestor;
    }

    scene.set_tag(
        target,
        ObjectTag {
            category,
            record: reference.record.id.clone(),
            door: reference.entry.door.clone(),
        },
    );
}
