use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use cellworld_common::{CellCoord, LAND_GRID_SIZE, RecordId, TEXTURE_INDEX_COUNT};
use serde::{Deserialize, Serialize};

use crate::records::{CellRecord, LandRecord, LandTextureRecord, Record};

/// Errors from database construction and file operations.
///
/// Lookups never fail: missing data is `None`.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate cell: {0}")]
    DuplicateCell(String),
    #[error("duplicate record: {0}")]
    DuplicateRecord(RecordId),
    #[error("malformed land record at {coord}: {reason}")]
    MalformedLand { coord: CellCoord, reason: String },
}

/// Read-only record lookups consumed by the streamer.
///
/// Implementations are shared with background build workers, so they must be
/// `Send + Sync`.
pub trait WorldDatabase: Send + Sync {
    fn find_exterior_cell(&self, coord: CellCoord) -> Option<Arc<CellRecord>>;

    /// Interior names are matched case-insensitively.
    fn find_interior_cell(&self, name: &str) -> Option<Arc<CellRecord>>;

    fn find_interior_cell_at(&self, coord: CellCoord) -> Option<Arc<CellRecord>>;

    fn find_land(&self, coord: CellCoord) -> Option<Arc<LandRecord>>;

    fn find_land_texture(&self, index: u16) -> Option<LandTextureRecord>;

    fn find_record(&self, id: &RecordId) -> Option<Arc<Record>>;
}

/// On-disk layout of a [`MemoryDatabase`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseFile {
    #[serde(default)]
    pub cells: Vec<CellRecord>,
    #[serde(default)]
    pub lands: Vec<LandRecord>,
    #[serde(default)]
    pub land_textures: Vec<LandTextureRecord>,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// In-memory world database.
///
/// Indexes cells by coordinate and lowercased interior name. Can be loaded
/// from and saved to JSON for fixtures and tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    exteriors: BTreeMap<CellCoord, Arc<CellRecord>>,
    interiors: BTreeMap<String, Arc<CellRecord>>,
    lands: BTreeMap<CellCoord, Arc<LandRecord>>,
    land_textures: BTreeMap<u16, LandTextureRecord>,
    records: BTreeMap<RecordId, Arc<Record>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_cell(&mut self, cell: CellRecord) -> Result<(), DatabaseError> {
        if cell.is_interior() {
            let key = cell.name.to_ascii_lowercase();
            if self.interiors.contains_key(&key) {
                return Err(DatabaseError::DuplicateCell(cell.name));
            }
            self.interiors.insert(key, Arc::new(cell));
        } else {
            if self.exteriors.contains_key(&cell.coord) {
                return Err(DatabaseError::DuplicateCell(cell.coord.to_string()));
            }
            self.exteriors.insert(cell.coord, Arc::new(cell));
        }
        Ok(())
    }

    /// Insert a land record after checking its grid sizes.
    pub fn insert_land(&mut self, land: LandRecord) -> Result<(), DatabaseError> {
        validate_land(&land)?;
        self.lands.insert(land.coord, Arc::new(land));
        Ok(())
    }

    pub fn insert_land_texture(&mut self, texture: LandTextureRecord) {
        self.land_textures.insert(texture.index, texture);
    }

    pub fn insert_record(&mut self, record: Record) -> Result<(), DatabaseError> {
        if self.records.contains_key(&record.id) {
            return Err(DatabaseError::DuplicateRecord(record.id));
        }
        self.records.insert(record.id.clone(), Arc::new(record));
        Ok(())
    }

    pub fn exterior_count(&self) -> usize {
        self.exteriors.len()
    }

    pub fn interior_count(&self) -> usize {
        self.interiors.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Coordinates of every exterior cell, in grid order.
    pub fn exterior_coords(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.exteriors.keys().copied()
    }

    /// Build a database from its file form, validating as it goes.
    pub fn from_file(file: DatabaseFile) -> Result<Self, DatabaseError> {
        let mut db = Self::new();
        for cell in file.cells {
            db.insert_cell(cell)?;
        }
        for land in file.lands {
            db.insert_land(land)?;
        }
        for texture in file.land_textures {
            db.insert_land_texture(texture);
        }
        for record in file.records {
            db.insert_record(record)?;
        }
        Ok(db)
    }

    pub fn to_file(&self) -> DatabaseFile {
        DatabaseFile {
            cells: self
                .exteriors
                .values()
                .chain(self.interiors.values())
                .map(|c| CellRecord::clone(c))
                .collect(),
            lands: self.lands.values().map(|l| LandRecord::clone(l)).collect(),
            land_textures: self.land_textures.values().cloned().collect(),
            records: self.records.values().map(|r| Record::clone(r)).collect(),
        }
    }

    /// Save the database to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DatabaseError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &self.to_file())?;
        Ok(())
    }

    /// Load a database from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let file = std::fs::File::open(path.as_ref())?;
        let contents: DatabaseFile = serde_json::from_reader(std::io::BufReader::new(file))?;
        let db = Self::from_file(contents)?;
        tracing::debug!(
            exteriors = db.exterior_count(),
            interiors = db.interior_count(),
            records = db.record_count(),
            path = %path.as_ref().display(),
            "world database loaded"
        );
        Ok(db)
    }
}

impl WorldDatabase for MemoryDatabase {
    fn find_exterior_cell(&self, coord: CellCoord) -> Option<Arc<CellRecord>> {
        self.exteriors.get(&coord).cloned()
    }

    fn find_interior_cell(&self, name: &str) -> Option<Arc<CellRecord>> {
        self.interiors.get(&name.to_ascii_lowercase()).cloned()
    }

    fn find_interior_cell_at(&self, coord: CellCoord) -> Option<Arc<CellRecord>> {
        self.interiors.values().find(|c| c.coord == coord).cloned()
    }

    fn find_land(&self, coord: CellCoord) -> Option<Arc<LandRecord>> {
        self.lands.get(&coord).cloned()
    }

    fn find_land_texture(&self, index: u16) -> Option<LandTextureRecord> {
        self.land_textures.get(&index).cloned()
    }

    fn find_record(&self, id: &RecordId) -> Option<Arc<Record>> {
        self.records.get(id).cloned()
    }
}

fn validate_land(land: &LandRecord) -> Result<(), DatabaseError> {
    let expected_heights = LAND_GRID_SIZE * LAND_GRID_SIZE;
    if let Some(heights) = &land.heights {
        if heights.deltas.len() != expected_heights {
            return Err(DatabaseError::MalformedLand {
                coord: land.coord,
                reason: format!(
                    "expected {expected_heights} height deltas, got {}",
                    heights.deltas.len()
                ),
            });
        }
    }
    if let Some(indices) = &land.texture_indices {
        if indices.len() != TEXTURE_INDEX_COUNT {
            return Err(DatabaseError::MalformedLand {
                coord: land.coord,
                reason: format!(
                    "expected {TEXTURE_INDEX_COUNT} texture indices, got {}",
                    indices.len()
                ),
            });
        }
    }
    Ok(())
}
