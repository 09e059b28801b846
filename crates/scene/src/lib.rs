//! Scene graph: the hierarchy cells, terrain and models are instantiated into.
//!
//! # Invariants
//! - A node has at most one parent and the hierarchy is acyclic.
//! - Activation is a per-node flag; a node is visible only if it and every
//!   ancestor are active.
//! - Every structural mutation is recorded in the event log until the owner
//!   drains it.

mod components;
mod graph;

pub use components::{Collider, LightSource, ObjectTag};
pub use graph::{Scene, SceneEvent, SceneNode};

pub fn crate_info() -> &'static str {
    "cellworld-scene v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("scene"));
    }
}
