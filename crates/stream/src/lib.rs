//! Cell streaming: keeps the cells around a moving viewpoint resident.
//!
//! # Invariants
//! - After an unbudgeted update, the tracked set is exactly the cells with a
//!   record inside the square window of the streaming radius.
//! - A tracked cell's objects are visible iff it lies within the detail
//!   radius. Interiors are always visible.
//! - Each cell is built at most once per cache; eviction only deactivates.
//! - The scene is touched only from the thread that calls into the streamer.

mod build;
mod cache;
mod config;
mod controller;
mod grid;
mod instantiate;
mod pool;
mod stats;

pub use build::{CellFactory, PreparedCell, prepare_cell};
pub use cache::{CellCache, CellKey, Claim, ResidentCell};
pub use config::{BuildMode, MAX_STREAMING_RADIUS, StreamConfig};
pub use controller::{CellStreamer, InteriorLookup, UpdateReport};
pub use grid::{CellGrid, MAX_CELL_COORD, in_window, ring, rings};
pub use instantiate::{
    ATTACH_LIGHT_NODE, ContentInstantiator, ModelInstancer, PlaceholderModelInstancer,
    ResolvedReference, reference_transform, resolve_references, source_position,
    source_rotation,
};
pub use pool::{BuildOutcome, BuildPool, BuildTicket, PendingBuild};
pub use stats::{StreamStats, UpdateTimer};

pub fn crate_info() -> &'static str {
    "cellworld-stream v0.1.0"
}
