// Copyright (c) 2026 Tributary
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Arena-backed merkle tree.
//!
//! Nodes live in a slab indexed by [`NodeId`]; routes carry the path from
//! the root instead of owning parent pointers. Reference counts start at one
//! and `release` is terminal once they reach zero.

use super::route::MerkleRoute;
use super::{MerkleError, MerkleResult};
use crate::core::ser::{ClassId, SelfSerializable};
use crate::core::types::Digest;
use std::fmt;

/// Index of a node inside its tree's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Node payload variants.
pub enum NodeKind {
    /// Application value.
    Leaf {
        /// The leaf's value.
        value: Box<dyn SelfSerializable>,
    },
    /// Ordered child slots (absent children allowed).
    Internal {
        /// Child ids in declared order; `None` is an absent child.
        children: Vec<Option<NodeId>>,
    },
    /// Terminal state after release; payload storage reclaimed.
    Released,
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Leaf { value } => write!(f, "Leaf({value:?})"),
            NodeKind::Internal { children } => write!(f, "Internal({children:?})"),
            NodeKind::Released => write!(f, "Released"),
        }
    }
}

/// A node's data: identity, lifecycle flags and payload.
#[derive(Debug)]
pub struct NodeData {
    class_id: ClassId,
    version: i32,
    route: MerkleRoute,
    reference_count: u32,
    hash: Option<Digest>,
    immutable: bool,
    kind: NodeKind,
}

impl NodeData {
    /// Stable class id.
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Version the node was created or deserialized at.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Route from the root.
    pub fn route(&self) -> &MerkleRoute {
        &self.route
    }

    /// Current reference count.
    pub fn reference_count(&self) -> u32 {
        self.reference_count
    }

    /// Lazily computed hash, if present.
    pub fn hash(&self) -> Option<Digest> {
        self.hash
    }

    /// True once the node refuses mutation.
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// True once the node was terminally released.
    pub fn is_released(&self) -> bool {
        matches!(self.kind, NodeKind::Released)
    }

    /// True for leaves.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// True for internal nodes.
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, NodeKind::Internal { .. })
    }

    /// Leaf value, if this is a leaf.
    pub fn value(&self) -> Option<&dyn SelfSerializable> {
        match &self.kind {
            NodeKind::Leaf { value } => Some(value.as_ref()),
            _ => None,
        }
    }

    /// Child slots, empty for leaves.
    pub fn children(&self) -> &[Option<NodeId>] {
        match &self.kind {
            NodeKind::Internal { children } => children,
            _ => &[],
        }
    }

    /// True if the leaf value carries its hash externally.
    pub fn is_self_hashing(&self) -> bool {
        self.value().map(|v| v.is_self_hashing()).unwrap_or(false)
    }
}

/// Arena of nodes forming one tree.
#[derive(Debug, Default)]
pub struct MerkleTree {
    slots: Vec<Option<NodeData>>,
    root: Option<NodeId>,
}

impl MerkleTree {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root node, if any.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of live (unreleased) nodes.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.as_ref().map(|n| !n.is_released()).unwrap_or(false))
            .count()
    }

    /// True when no live node exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable access to a node.
    pub fn node(&self, id: NodeId) -> MerkleResult<&NodeData> {
        self.slots
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(MerkleError::InvalidNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> MerkleResult<&mut NodeData> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(MerkleError::InvalidNode(id))
    }

    /// Mutable access that enforces the lifecycle flags.
    fn node_mut_checked(&mut self, id: NodeId) -> MerkleResult<&mut NodeData> {
        let node = self.node_mut(id)?;
        if node.is_released() {
            return Err(MerkleError::NodeReleased(id));
        }
        if node.immutable {
            return Err(MerkleError::NodeImmutable(id));
        }
        Ok(node)
    }

    fn insert(&mut self, node: NodeData) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(node));
        id
    }

    /// Create a detached leaf. Class id and version come from the value.
    pub fn create_leaf(&mut self, value: Box<dyn SelfSerializable>) -> NodeId {
        let class_id = value.class_id();
        let version = value.version();
        self.insert(NodeData {
            class_id,
            version,
            route: MerkleRoute::empty(),
            reference_count: 1,
            hash: None,
            immutable: false,
            kind: NodeKind::Leaf { value },
        })
    }

    /// Create a detached internal node with `child_count` empty slots.
    pub fn create_internal(
        &mut self,
        class_id: ClassId,
        version: i32,
        child_count: usize,
    ) -> NodeId {
        self.insert(NodeData {
            class_id,
            version,
            route: MerkleRoute::empty(),
            reference_count: 1,
            hash: None,
            immutable: false,
            kind: NodeKind::Internal {
                children: vec![None; child_count],
            },
        })
    }

    /// Make `id` the root; its route (and its descendants') becomes empty-based.
    pub fn set_root(&mut self, id: Option<NodeId>) -> MerkleResult<()> {
        if let Some(id) = id {
            self.node(id)?;
            self.rewrite_routes(id, MerkleRoute::empty())?;
        }
        self.root = id;
        Ok(())
    }

    /// Attach `child` at slot `index` of `parent`, updating routes.
    ///
    /// The child's route becomes the parent's route extended by `index`, and
    /// every descendant route is rewritten underneath it. The parent's hash
    /// and the hashes of all its ancestors are invalidated.
    pub fn set_child(
        &mut self,
        parent: NodeId,
        index: usize,
        child: Option<NodeId>,
    ) -> MerkleResult<()> {
        if let Some(child_id) = child {
            self.node(child_id)?;
        }
        let parent_route = {
            let node = self.node_mut_checked(parent)?;
            let route = node.route.clone();
            match &mut node.kind {
                NodeKind::Internal { children } => {
                    let count = children.len();
                    let slot = children
                        .get_mut(index)
                        .ok_or(MerkleError::ChildIndexOutOfBounds {
                            node: parent,
                            index,
                            count,
                        })?;
                    *slot = child;
                }
                _ => return Err(MerkleError::WrongNodeKind(parent)),
            }
            route
        };
        if let Some(child_id) = child {
            self.rewrite_routes(child_id, parent_route.extend(index as u32))?;
        }
        // Only invalidate along the root path when the parent is attached.
        if self.node_at_route(&parent_route) == Some(parent) {
            self.invalidate_hashes_to_root(&parent_route);
        } else {
            self.node_mut(parent)?.hash = None;
        }
        Ok(())
    }

    /// Rewrite `id`'s route and every descendant's, iteratively.
    fn rewrite_routes(&mut self, id: NodeId, route: MerkleRoute) -> MerkleResult<()> {
        let mut stack = vec![(id, route)];
        while let Some((id, route)) = stack.pop() {
            let node = self.node_mut(id)?;
            node.route = route.clone();
            if let NodeKind::Internal { children } = &node.kind {
                for (i, child) in children.iter().enumerate() {
                    if let Some(child) = child {
                        stack.push((*child, route.extend(i as u32)));
                    }
                }
            }
        }
        Ok(())
    }

    /// Null out the hash of the node at `route` and of every ancestor.
    fn invalidate_hashes_to_root(&mut self, route: &MerkleRoute) {
        let Some(root) = self.root else {
            // Detached subtree: only the target node itself can be reached.
            return;
        };
        let mut current = root;
        let mut depth = 0usize;
        loop {
            if let Ok(node) = self.node_mut(current) {
                node.hash = None;
            } else {
                return;
            }
            if depth == route.depth() {
                return;
            }
            let step = route.steps()[depth] as usize;
            let next = match self.node(current) {
                Ok(node) => node.children().get(step).copied().flatten(),
                Err(_) => None,
            };
            match next {
                Some(next) => {
                    current = next;
                    depth += 1;
                }
                None => return,
            }
        }
    }

    /// Set a node's hash. Self-hashing leaves are never overwritten.
    pub fn set_hash(&mut self, id: NodeId, hash: Digest) -> MerkleResult<()> {
        let node = self.node_mut(id)?;
        if node.is_released() {
            return Err(MerkleError::NodeReleased(id));
        }
        if node.is_self_hashing() && node.hash.is_some() {
            return Ok(());
        }
        node.hash = Some(hash);
        Ok(())
    }

    /// Clear a node's hash (marks it for lazy recomputation).
    pub fn clear_hash(&mut self, id: NodeId) -> MerkleResult<()> {
        let node = self.node_mut(id)?;
        node.hash = None;
        Ok(())
    }

    /// Mark a node immutable. One-way.
    pub fn seal(&mut self, id: NodeId) -> MerkleResult<()> {
        let node = self.node_mut(id)?;
        if node.is_released() {
            return Err(MerkleError::NodeReleased(id));
        }
        node.immutable = true;
        Ok(())
    }

    /// Mark a whole subtree immutable.
    pub fn seal_subtree(&mut self, id: NodeId) -> MerkleResult<()> {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            self.seal(id)?;
            stack.extend(self.node(id)?.children().iter().flatten().copied());
        }
        Ok(())
    }

    /// Bump a node's reference count (a shared subtree).
    pub fn reserve(&mut self, id: NodeId) -> MerkleResult<()> {
        let node = self.node_mut(id)?;
        if node.is_released() {
            return Err(MerkleError::NodeReleased(id));
        }
        node.reference_count += 1;
        Ok(())
    }

    /// Drop one reference. At zero the node is terminally released: payload
    /// storage is reclaimed, children are released recursively, and every
    /// further mutation fails.
    pub fn release(&mut self, id: NodeId) -> MerkleResult<()> {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let node = self.node_mut(id)?;
            if node.is_released() {
                return Err(MerkleError::NodeReleased(id));
            }
            node.reference_count = node.reference_count.saturating_sub(1);
            if node.reference_count > 0 {
                continue;
            }
            let kind = std::mem::replace(&mut node.kind, NodeKind::Released);
            if let NodeKind::Internal { children } = kind {
                stack.extend(children.into_iter().flatten());
            }
        }
        Ok(())
    }

    /// Resolve a route to a node, starting at the root.
    pub fn node_at_route(&self, route: &MerkleRoute) -> Option<NodeId> {
        let mut current = self.root?;
        for step in route.steps() {
            let node = self.node(current).ok()?;
            current = node.children().get(*step as usize).copied().flatten()?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ser::basic::RawBytes;

    fn leaf(tree: &mut MerkleTree, bytes: &[u8]) -> NodeId {
        tree.create_leaf(Box::new(RawBytes::new(bytes.to_vec())))
    }

    #[test]
    fn routes_follow_attachment() {
        let mut tree = MerkleTree::new();
        let root = tree.create_internal(ClassId(0xA), 1, 2);
        let inner = tree.create_internal(ClassId(0xA), 1, 2);
        let a = leaf(&mut tree, b"a");
        let b = leaf(&mut tree, b"b");

        tree.set_root(Some(root)).unwrap();
        tree.set_child(root, 0, Some(inner)).unwrap();
        tree.set_child(inner, 1, Some(a)).unwrap();
        tree.set_child(root, 1, Some(b)).unwrap();

        assert_eq!(tree.node(root).unwrap().route().to_string(), "/");
        assert_eq!(tree.node(inner).unwrap().route().to_string(), "/0");
        assert_eq!(tree.node(a).unwrap().route().to_string(), "/0/1");
        assert_eq!(tree.node(b).unwrap().route().to_string(), "/1");
        assert_eq!(tree.node_at_route(tree.node(a).unwrap().route()), Some(a));
    }

    #[test]
    fn reattachment_rewrites_descendant_routes() {
        let mut tree = MerkleTree::new();
        let root = tree.create_internal(ClassId(0xA), 1, 2);
        let inner = tree.create_internal(ClassId(0xA), 1, 1);
        let a = leaf(&mut tree, b"a");
        tree.set_root(Some(root)).unwrap();
        tree.set_child(root, 0, Some(inner)).unwrap();
        tree.set_child(inner, 0, Some(a)).unwrap();
        assert_eq!(tree.node(a).unwrap().route().to_string(), "/0/0");

        // Move the subtree to the other slot.
        tree.set_child(root, 0, None).unwrap();
        tree.set_child(root, 1, Some(inner)).unwrap();
        assert_eq!(tree.node(a).unwrap().route().to_string(), "/1/0");
    }

    #[test]
    fn release_is_terminal_and_recursive() {
        let mut tree = MerkleTree::new();
        let root = tree.create_internal(ClassId(0xA), 1, 1);
        let a = leaf(&mut tree, b"a");
        tree.set_root(Some(root)).unwrap();
        tree.set_child(root, 0, Some(a)).unwrap();

        tree.release(root).unwrap();
        assert!(tree.node(root).unwrap().is_released());
        assert!(tree.node(a).unwrap().is_released());
        assert!(matches!(
            tree.set_child(root, 0, None),
            Err(MerkleError::NodeReleased(_))
        ));
        assert!(matches!(
            tree.release(root),
            Err(MerkleError::NodeReleased(_))
        ));
    }

    #[test]
    fn reserve_delays_release() {
        let mut tree = MerkleTree::new();
        let a = leaf(&mut tree, b"a");
        tree.reserve(a).unwrap();
        tree.release(a).unwrap();
        assert!(!tree.node(a).unwrap().is_released());
        tree.release(a).unwrap();
        assert!(tree.node(a).unwrap().is_released());
    }

    #[test]
    fn immutable_rejects_mutation() {
        let mut tree = MerkleTree::new();
        let root = tree.create_internal(ClassId(0xA), 1, 1);
        tree.set_root(Some(root)).unwrap();
        tree.seal(root).unwrap();
        assert!(matches!(
            tree.set_child(root, 0, None),
            Err(MerkleError::NodeImmutable(_))
        ));
    }

    #[test]
    fn mutation_invalidates_ancestor_hashes() {
        let mut tree = MerkleTree::new();
        let root = tree.create_internal(ClassId(0xA), 1, 2);
        let a = leaf(&mut tree, b"a");
        tree.set_root(Some(root)).unwrap();
        tree.set_child(root, 0, Some(a)).unwrap();
        tree.set_hash(root, crate::core::types::Digest::ZERO).unwrap();

        let b = leaf(&mut tree, b"b");
        tree.set_child(root, 1, Some(b)).unwrap();
        assert!(tree.node(root).unwrap().hash().is_none());
    }
}
