use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }
}

/// Identifier of a world-database record. Lookups are case-insensitive, so
/// ids are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<RecordId> for String {
    fn from(value: RecordId) -> Self {
        value.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gameplay category an instantiated object is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectCategory {
    Door,
    Activator,
    Container,
    Light,
    Lockpick,
    Probe,
    RepairTool,
    Weapon,
    Clothing,
    Armor,
    Ingredient,
    Alchemy,
    Apparatus,
    Book,
    MiscItem,
    Creature,
    Npc,
}

impl ObjectCategory {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Door => "Door",
            Self::Activator => "Activator",
            Self::Container => "Container",
            Self::Light => "Light",
            Self::Lockpick => "Lockpick",
            Self::Probe => "Probe",
            Self::RepairTool => "RepairTool",
            Self::Weapon => "Weapon",
            Self::Clothing => "Clothing",
            Self::Armor => "Armor",
            Self::Ingredient => "Ingredient",
            Self::Alchemy => "Alchemy",
            Self::Apparatus => "Apparatus",
            Self::Book => "Book",
            Self::MiscItem => "MiscItem",
            Self::Creature => "Creature",
            Self::Npc => "NPC",
        }
    }

    /// Whether the player can pick objects of this category up.
    pub fn is_item(self) -> bool {
        !matches!(
            self,
            Self::Door | Self::Activator | Self::Container | Self::Creature | Self::Npc
        )
    }
}

/// Where a door reference leads. Position and rotation use the source
/// record convention (Z-up, Euler radians).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorDestination {
    /// Interior cell name, or `None` for the exterior world.
    pub cell: Option<String>,
    pub position: Vec3,
    pub rotation: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_uniqueness() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
    }

    #[test]
    fn transform_matrix_round_trip() {
        let t = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.5),
            scale: Vec3::splat(2.0),
        };
        let back = Transform::from_matrix(t.to_matrix());
        assert!(back.position.abs_diff_eq(t.position, 1e-5));
        assert!(back.scale.abs_diff_eq(t.scale, 1e-5));
        assert!(back.rotation.abs_diff_eq(t.rotation, 1e-5));
    }

    #[test]
    fn record_ids_are_case_insensitive() {
        assert_eq!(RecordId::new("Ex_Common_Door"), RecordId::from("ex_common_door"));
        let parsed: RecordId = serde_json::from_str("\"LIGHT_Torch\"").unwrap();
        assert_eq!(parsed.as_str(), "light_torch");
    }

    #[test]
    fn category_tags() {
        assert_eq!(ObjectCategory::Npc.tag(), "NPC");
        assert!(ObjectCategory::Book.is_item());
        assert!(!ObjectCategory::Door.is_item());
    }
}
