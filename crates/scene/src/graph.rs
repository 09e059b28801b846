use std::collections::BTreeMap;

use cellworld_common::{NodeId, Transform};
use serde::{Deserialize, Serialize};

use crate::components::{Collider, LightSource, ObjectTag};

/// An event record produced by every structural mutation of the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneEvent {
    /// Node was spawned under the given parent.
    Spawned { id: NodeId, parent: Option<NodeId> },
    /// Node moved to a new parent.
    Reparented {
        id: NodeId,
        old: Option<NodeId>,
        new: Option<NodeId>,
    },
    /// Node's own active flag flipped.
    ActivationChanged { id: NodeId, active: bool },
    /// Node received a gameplay tag.
    Tagged { id: NodeId, tag: ObjectTag },
}

/// Per-node data stored in the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    /// Transform relative to the parent.
    pub transform: Transform,
    pub collider: Option<Collider>,
    pub light: Option<LightSource>,
    pub tag: Option<ObjectTag>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    active: bool,
}

impl SceneNode {
    fn new(name: String, transform: Transform, parent: Option<NodeId>) -> Self {
        Self {
            name,
            transform,
            collider: None,
            light: None,
            tag: None,
            parent,
            children: Vec::new(),
            active: true,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The node's own flag, ignoring ancestors.
    pub fn active_self(&self) -> bool {
        self.active
    }
}

/// Hierarchical scene owned by a single thread.
///
/// Uses BTreeMap for deterministic iteration order. Children keep insertion
/// order, so depth-first walks are reproducible.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    nodes: BTreeMap<NodeId, SceneNode>,
    event_log: Vec<SceneEvent>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[SceneEvent] {
        &self.event_log
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(&id)
    }

    /// Spawn a root node.
    pub fn spawn(&mut self, name: impl Into<String>, transform: Transform) -> NodeId {
        let id = NodeId::new();
        self.nodes
            .insert(id, SceneNode::new(name.into(), transform, None));
        self.event_log.push(SceneEvent::Spawned { id, parent: None });
        id
    }

    /// Spawn a node under `parent`. Falls back to a root node if the parent
    /// does not exist.
    pub fn spawn_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        transform: Transform,
    ) -> NodeId {
        let name = name.into();
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            tracing::warn!(?parent, %name, "parent missing, spawning as root");
            return self.spawn(name, transform);
        };
        let id = NodeId::new();
        parent_node.children.push(id);
        self.nodes
            .insert(id, SceneNode::new(name, transform, Some(parent)));
        self.event_log.push(SceneEvent::Spawned {
            id,
            parent: Some(parent),
        });
        id
    }

    /// Move `id` under `parent` (or to the root with `None`), keeping its
    /// local transform. Returns false if either node is missing or the move
    /// would create a cycle.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> bool {
        if !self.nodes.contains_key(&id) {
            return false;
        }
        if let Some(p) = parent {
            if !self.nodes.contains_key(&p) || p == id || self.is_ancestor_of(id, p) {
                return false;
            }
        }

        let old = self.nodes.get(&id).and_then(|n| n.parent);
        if old == parent {
            return true;
        }
        if let Some(old_parent) = old.and_then(|o| self.nodes.get_mut(&o)) {
            old_parent.children.retain(|c| *c != id);
        }
        if let Some(new_parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            new_parent.children.push(id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }
        self.event_log.push(SceneEvent::Reparented {
            id,
            old,
            new: parent,
        });
        true
    }

    /// Whether `ancestor` appears on the parent chain of `id`.
    pub fn is_ancestor_of(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Parent chain of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        std::iter::from_fn(move || {
            let next = current?;
            current = self.nodes.get(&next).and_then(|n| n.parent);
            Some(next)
        })
    }

    /// Depth-first, pre-order list of `root` and everything below it.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// First node named `name` in a depth-first walk of `root`'s subtree
    /// (root included).
    pub fn find_descendant(&self, root: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|id| self.nodes.get(id).is_some_and(|n| n.name == name))
    }

    /// Set a node's own active flag. Returns false if the node is missing.
    pub fn set_active(&mut self, id: NodeId, active: bool) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if node.active != active {
            node.active = active;
            self.event_log
                .push(SceneEvent::ActivationChanged { id, active });
        }
        true
    }

    /// The node's own flag. Missing nodes are inactive.
    pub fn is_active(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.active)
    }

    /// True if the node and all of its ancestors are active.
    pub fn is_active_in_hierarchy(&self, id: NodeId) -> bool {
        self.is_active(id) && self.ancestors(id).all(|a| self.is_active(a))
    }

    /// Compose local transforms from the root down to `id`.
    pub fn world_transform(&self, id: NodeId) -> Option<Transform> {
        let node = self.nodes.get(&id)?;
        let mut matrix = node.transform.to_matrix();
        for ancestor in self.ancestors(id) {
            let parent = self.nodes.get(&ancestor)?;
            matrix = parent.transform.to_matrix() * matrix;
        }
        Some(Transform::from_matrix(matrix))
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.transform = transform;
                true
            }
            None => false,
        }
    }

    pub fn set_collider(&mut self, id: NodeId, collider: Collider) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.collider = Some(collider);
                true
            }
            None => false,
        }
    }

    pub fn set_light(&mut self, id: NodeId, light: LightSource) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.light = Some(light);
                true
            }
            None => false,
        }
    }

    pub fn set_tag(&mut self, id: NodeId, tag: ObjectTag) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        node.tag = Some(tag.clone());
        self.event_log.push(SceneEvent::Tagged { id, tag });
        true
    }

    /// Nodes carrying a gameplay tag, in id order.
    pub fn tagged(&self) -> impl Iterator<Item = (NodeId, &ObjectTag)> + '_ {
        self.nodes
            .iter()
            .filter_map(|(id, n)| n.tag.as_ref().map(|t| (*id, t)))
    }
}
