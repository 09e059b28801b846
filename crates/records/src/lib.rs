//! World database records and the lookup interface the streamer consumes.
//!
//! Records are read-only once loaded and are handed out as `Arc`s, so build
//! workers can hold them without copying.
//!
//! # Layout
//! [`MemoryDatabase`] persists as a single JSON document ([`DatabaseFile`]).
//! Real game data formats plug in by implementing [`WorldDatabase`].

mod database;
mod records;

pub use database::{DatabaseError, DatabaseFile, MemoryDatabase, WorldDatabase};
pub use records::{
    CellKind, CellRecord, HeightField, LandRecord, LandTextureRecord, LightData, Record,
    RecordData, ReferenceEntry,
};

pub fn crate_info() -> &'static str {
    "cellworld-records v0.1.0"
}
