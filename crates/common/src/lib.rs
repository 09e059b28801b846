//! Shared types for the cellworld engine.
//!
//! Everything here is plain data: grid coordinates, scene node ids, record ids
//! and the gameplay categories objects get tagged with.
//!
//! # Conventions
//! - The scene is Y-up. Exterior grid axis `x` maps to world X and grid axis
//!   `z` maps to world Z.
//! - Source records are Z-up; conversion happens at instantiation time.

mod coord;
mod types;

pub use coord::CellCoord;
pub use types::{DoorDestination, NodeId, ObjectCategory, RecordId, Transform};

/// Samples per side of a land record's height grid.
pub const LAND_GRID_SIZE: usize = 65;

/// Entries in a land record's texture-index grid (16×16 blocks of 4×4).
pub const TEXTURE_INDEX_COUNT: usize = 256;

/// World height units per height-delta unit.
pub const HEIGHT_DELTA_SCALE: f32 = 8.0;

pub fn crate_info() -> &'static str {
    "cellworld-common v0.1.0"
}
