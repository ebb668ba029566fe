//! Scene nodes and the directed acyclic graph they form.
//!
//! Edges are stored on both ends: a parent lists its children, a child its
//! parents. A node may have several parents, which is how a subtree is
//! instanced more than once. Edges that would close a cycle are refused.

use std::collections::{HashSet, VecDeque};

use log::{debug, warn};
use vecmath::Matrix4;

use crate::animated::AnimatedValue;
use crate::document::Document;
use crate::entity::{Entity, EntityType};
use crate::tracking::{EntityKey, InstanceKey, ObjectFlags};
use crate::transform::{compose, Transform, TransformKind};

#[derive(Clone, Debug, Default)]
pub struct SceneNode {
    pub(crate) transforms: Vec<Transform>,
    pub(crate) children: Vec<EntityKey>,
    pub(crate) parents: Vec<EntityKey>,
    pub(crate) instances: Vec<InstanceKey>,
    pub is_joint: bool,
}

impl SceneNode {
    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn children(&self) -> &[EntityKey] {
        &self.children
    }

    pub fn parents(&self) -> &[EntityKey] {
        &self.parents
    }

    pub fn instances(&self) -> &[InstanceKey] {
        &self.instances
    }
}

impl Document {
    fn scene_node(&self, key: EntityKey) -> Option<&SceneNode> {
        self.entity(key).and_then(Entity::scene_node)
    }

    fn scene_node_mut(&mut self, key: EntityKey) -> Option<&mut SceneNode> {
        self.entity_mut(key).and_then(Entity::scene_node_mut)
    }

    /// Whether `candidate` is `node` or one of its ancestors, searching
    /// breadth first through every parent.
    pub fn is_ancestor_or_self(&self, node: EntityKey, candidate: EntityKey) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(node);
        while let Some(current) = queue.pop_front() {
            if current == candidate {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(n) = self.scene_node(current) {
                queue.extend(n.parents.iter().copied());
            }
        }
        false
    }

    /// Attach `child` below `parent`.
    ///
    /// Refused, with no change to either node, when `child` is `parent`,
    /// already one of its children, or one of its ancestors.
    pub fn add_child(&mut self, parent: EntityKey, child: EntityKey) -> bool {
        let already_child = match (self.scene_node(parent), self.scene_node(child)) {
            (Some(p), Some(_)) => p.children.contains(&child),
            _ => return false,
        };
        if already_child || self.is_ancestor_or_self(parent, child) {
            debug!("refusing edge {:?} -> {:?}", parent, child);
            return false;
        }
        if let Some(p) = self.scene_node_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.scene_node_mut(child) {
            c.parents.push(parent);
        }
        self.set_flag(parent, ObjectFlags::NEW_CHILD, true);
        true
    }

    /// Detach `child` from `parent`. Returns whether the edge existed.
    ///
    /// The child is not released even if this was its last parent. It stays
    /// alive for re-parenting until `collect_orphans` runs or one of its
    /// remaining ancestors is released.
    pub fn remove_child(&mut self, parent: EntityKey, child: EntityKey) -> bool {
        let mut removed = false;
        if let Some(p) = self.scene_node_mut(parent) {
            let before = p.children.len();
            p.children.retain(|&c| c != child);
            removed = before != p.children.len();
        }
        if let Some(c) = self.scene_node_mut(child) {
            c.parents.retain(|&p| p != parent);
        }
        removed
    }

    /// Create a node owned by `parent` alone.
    pub fn add_child_node(&mut self, parent: EntityKey) -> Option<EntityKey> {
        self.scene_node(parent)?;
        let child = self.insert_entity(EntityType::SceneNode, None);
        if !self.add_child(parent, child) {
            self.release_entity(child);
            return None;
        }
        Some(child)
    }

    /// Append a transform to `node`'s stack and register its values as
    /// animatable under its sid. Returns the transform's index.
    pub fn add_transform(&mut self, node: EntityKey, kind: TransformKind, sid: Option<&str>, values: &[f32]) -> Option<usize> {
        self.scene_node(node)?;
        if values.len() != kind.value_count() {
            warn!(
                "<{}> takes {} values, got {}",
                kind.element_name(),
                kind.value_count(),
                values.len()
            );
            return None;
        }
        let transform = Transform {
            kind,
            sid: sid.map(str::to_string),
            slots: self.values.alloc_all(values),
        };
        let value = AnimatedValue::new(transform.animation_sid(), &transform.slots, &kind.qualifiers()[..]).with_owner(node.0);
        let id = self.dae_id(node).map(str::to_string);
        self.register_animated(value, id.as_deref());

        let n = self.scene_node_mut(node)?;
        n.transforms.push(transform);
        Some(n.transforms.len() - 1)
    }

    pub fn remove_transform(&mut self, node: EntityKey, index: usize) -> bool {
        let transform = match self.scene_node_mut(node) {
            Some(n) if index < n.transforms.len() => n.transforms.remove(index),
            _ => return false,
        };
        if let Some(key) = transform.slots.first().and_then(|&s| self.animated.find_by_slot(s)) {
            self.animated.unregister(key);
        }
        for slot in transform.slots {
            self.values.free(slot);
        }
        true
    }

    /// The node's transform stack composed into one column-major matrix.
    pub fn node_local_transform(&self, node: EntityKey) -> Option<Matrix4<f32>> {
        Some(compose(&self.scene_node(node)?.transforms, &self.values))
    }

    /// Attach a new instance of `entity` to `node`.
    pub fn node_instantiate(&mut self, node: EntityKey, entity: EntityKey) -> Option<InstanceKey> {
        self.scene_node(node)?;
        self.instantiate(node, entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LibraryKind;

    fn children(doc: &Document, node: EntityKey) -> Vec<EntityKey> {
        doc.entity(node).and_then(Entity::scene_node).unwrap().children().to_vec()
    }

    #[test]
    fn test_back_edge_is_refused() {
        let mut doc = Document::new();
        let root = doc.add_entity(LibraryKind::VisualScenes);
        let child = doc.add_entity(LibraryKind::Nodes);

        assert!(doc.add_child(root, child));
        assert!(!doc.add_child(child, root));
        assert_eq!(children(&doc, root), vec![child]);
        assert!(children(&doc, child).is_empty());
    }

    #[test]
    fn test_self_duplicate_and_deep_cycles_are_refused() {
        let mut doc = Document::new();
        let a = doc.add_entity(LibraryKind::Nodes);
        let b = doc.add_child_node(a).unwrap();
        let c = doc.add_child_node(b).unwrap();

        assert!(!doc.add_child(a, a));
        assert!(!doc.add_child(a, b));
        assert!(!doc.add_child(c, a));
        assert!(doc.is_ancestor_or_self(c, a));
        assert!(!doc.is_ancestor_or_self(a, c));
    }

    #[test]
    fn test_shared_child_has_two_parents() {
        let mut doc = Document::new();
        let left = doc.add_entity(LibraryKind::Nodes);
        let right = doc.add_entity(LibraryKind::Nodes);
        let wheel = doc.add_entity(LibraryKind::Nodes);
        assert!(doc.add_child(left, wheel));
        assert!(doc.add_child(right, wheel));
        let parents = doc.entity(wheel).and_then(Entity::scene_node).unwrap().parents().to_vec();
        assert_eq!(parents, vec![left, right]);

        assert!(doc.remove_child(left, wheel));
        assert!(!doc.remove_child(left, wheel));
        assert_eq!(doc.entity(wheel).and_then(Entity::scene_node).unwrap().parents(), &[right]);
    }

    #[test]
    fn test_release_sweeps_orphaned_subtree() {
        let mut doc = Document::new();
        let scene = doc.add_entity(LibraryKind::VisualScenes);
        let shared = doc.add_entity(LibraryKind::Nodes);
        let a = doc.add_child_node(scene).unwrap();
        let b = doc.add_child_node(a).unwrap();
        doc.add_child(a, shared);

        assert!(doc.release_entity(a));
        assert!(doc.entity(b).is_none());
        assert!(doc.entity(shared).is_some());
        assert!(children(&doc, scene).is_empty());
        assert!(doc.entity(shared).and_then(Entity::scene_node).unwrap().parents().is_empty());
    }

    #[test]
    fn test_detached_node_survives_unrelated_release() {
        let mut doc = Document::new();
        let scene = doc.add_entity(LibraryKind::VisualScenes);
        let arm = doc.add_child_node(scene).unwrap();
        let hand = doc.add_child_node(arm).unwrap();
        let prop = doc.add_entity(LibraryKind::Nodes);

        assert!(doc.remove_child(arm, hand));
        assert!(doc.release_entity(prop));
        assert!(doc.entity(hand).is_some());
        assert!(doc.add_child(scene, hand));

        assert!(doc.remove_child(scene, hand));
        assert_eq!(doc.collect_orphans(), 1);
        assert!(doc.entity(hand).is_none());
        assert!(doc.entity(arm).is_some());
    }

    #[test]
    fn test_transforms_are_animatable() {
        let mut doc = Document::new();
        let node = doc.add_entity(LibraryKind::Nodes);
        doc.set_dae_id(node, "arm");
        doc.add_transform(node, TransformKind::Translate, None, &[1.0, 2.0, 3.0]);
        doc.add_transform(node, TransformKind::Rotate, Some("rz"), &[0.0, 0.0, 1.0, 90.0]);
        assert!(doc.add_transform(node, TransformKind::Scale, None, &[1.0]).is_none());

        assert!(doc.animated_values().find_by_target("arm/translate.X").is_some());
        assert_eq!(doc.animated_values().find_by_target("arm/rz.ANGLE").map(|(_, c)| c), Some(Some(3)));

        let m = doc.node_local_transform(node).unwrap();
        assert!((m[3][0] - 1.0).abs() < 1e-6);
        assert!((m[3][2] - 3.0).abs() < 1e-6);

        assert!(doc.remove_transform(node, 0));
        assert!(doc.animated_values().find_by_target("arm/translate").is_none());
        assert_eq!(doc.animated_values().len(), 1);
    }
}
