use cellworld_common::{CellCoord, DoorDestination, ObjectCategory, RecordId};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// One placed object inside a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub target: RecordId,
    /// Source convention: Z-up world units.
    pub position: Vec3,
    /// Euler angles in radians about the source X, Y, Z axes.
    pub rotation: Vec3,
    /// Uniform scale override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub door: Option<DoorDestination>,
}

impl ReferenceEntry {
    pub fn new(target: impl Into<RecordId>, position: Vec3) -> Self {
        Self {
            target: target.into(),
            position,
            rotation: Vec3::ZERO,
            scale: None,
            door: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellKind {
    Exterior,
    Interior {
        /// Ambient colour of the interior, 0-255 per channel.
        ambient: [u8; 3],
    },
}

/// A cell and the objects placed in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// Unique for interiors; a region label (possibly empty) for exteriors.
    #[serde(default)]
    pub name: String,
    /// Grid position. Meaningful for exteriors, informational for interiors.
    #[serde(default)]
    pub coord: CellCoord,
    pub kind: CellKind,
    #[serde(default)]
    pub references: Vec<ReferenceEntry>,
}

impl CellRecord {
    pub fn exterior(coord: CellCoord) -> Self {
        Self {
            name: String::new(),
            coord,
            kind: CellKind::Exterior,
            references: Vec::new(),
        }
    }

    pub fn interior(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coord: CellCoord::default(),
            kind: CellKind::Interior {
                ambient: [64, 64, 64],
            },
            references: Vec::new(),
        }
    }

    pub fn with_reference(mut self, reference: ReferenceEntry) -> Self {
        self.references.push(reference);
        self
    }

    pub fn is_interior(&self) -> bool {
        matches!(self.kind, CellKind::Interior { .. })
    }
}

/// Raw height data of a land record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightField {
    /// Starting height, in delta units.
    pub reference_height: f32,
    /// Row-major 65×65 grid of per-sample deltas.
    pub deltas: Vec<i8>,
}

/// Height and ground-texture data owned by one exterior cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandRecord {
    pub coord: CellCoord,
    #[serde(default)]
    pub heights: Option<HeightField>,
    /// 256 raw texture indices (16×16 blocks of 4×4). 0 means the default
    /// texture; any other value is a land-texture index plus one.
    #[serde(default)]
    pub texture_indices: Option<Vec<u16>>,
}

impl LandRecord {
    pub fn new(coord: CellCoord) -> Self {
        Self {
            coord,
            heights: None,
            texture_indices: None,
        }
    }
}

/// Maps a land-texture index to a texture file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandTextureRecord {
    pub index: u16,
    pub path: String,
}

/// Light-specific record data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightData {
    pub radius: f32,
    pub color: [u8; 3],
    #[serde(default)]
    pub flicker: bool,
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            radius: 256.0,
            color: [255, 200, 140],
            flicker: false,
        }
    }
}

/// Closed set of record categories a reference can point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordData {
    Static,
    Door,
    Activator,
    Container,
    Light(LightData),
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

impl RecordData {
    /// Gameplay category, or `None` for plain scenery.
    pub fn category(&self) -> Option<ObjectCategory> {
        let category = match self {
            Self::Static => return None,
            Self::Door => ObjectCategory::Door,
            Self::Activator => ObjectCategory::Activator,
            Self::Container => ObjectCategory::Container,
            Self::Light(_) => ObjectCategory::Light,
            Self::Lockpick => ObjectCategory::Lockpick,
            Self::Probe => ObjectCategory::Probe,
            Self::RepairTool => ObjectCategory::RepairTool,
            Self::Weapon => ObjectCategory::Weapon,
            Self::Clothing => ObjectCategory::Clothing,
            Self::Armor => ObjectCategory::Armor,
            Self::Ingredient => ObjectCategory::Ingredient,
            Self::Alchemy => ObjectCategory::Alchemy,
            Self::Apparatus => ObjectCategory::Apparatus,
            Self::Book => ObjectCategory::Book,
            Self::MiscItem => ObjectCategory::MiscItem,
            Self::Creature => ObjectCategory::Creature,
            Self::Npc => ObjectCategory::Npc,
        };
        Some(category)
    }
}

/// Any record a cell reference can resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Model path relative to the asset root.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(flatten)]
    pub data: RecordData,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, model: Option<&str>, data: RecordData) -> Self {
        Self {
            id: id.into(),
            model: model.map(str::to_owned),
            data,
        }
    }

    pub fn light(&self) -> Option<&LightData> {
        match &self.data {
            RecordData::Light(light) => Some(light),
            _ => None,
        }
    }
}
