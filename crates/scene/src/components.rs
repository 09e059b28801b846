use cellworld_common::{DoorDestination, ObjectCategory, RecordId};
use serde::{Deserialize, Serialize};

/// Collision shape carried by a node. Physics consumes these; the scene only
/// records which node owns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Collider {
    Box { half_extents: [f32; 3] },
    Sphere { radius: f32 },
    /// Triangle mesh taken from the model file.
    Mesh { source: String },
    /// Terrain heightfield with the given sample grid.
    Heightfield { rows: usize, cols: usize },
}

impl Default for Collider {
    fn default() -> Self {
        Self::Box {
            half_extents: [0.5, 0.5, 0.5],
        }
    }
}

/// Point light attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightSource {
    pub radius: f32,
    /// Linear RGB in `[0, 1]`.
    pub color: [f32; 3],
    pub flicker: bool,
    /// Interior lights are rendered without shadows and at reduced range.
    pub indoors: bool,
}

/// Gameplay semantics attached to the node that represents an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectTag {
    pub category: ObjectCategory,
    pub record: RecordId,
    /// Set for doors that teleport.
    pub door: Option<DoorDestination>,
}
