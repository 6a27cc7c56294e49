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

//! Lazy, finite, non-restartable traversals over a merkle tree.
//!
//! Two filters are overridable per iterator: `should_visit` prunes a whole
//! subtree, `should_return` skips a node but still descends into it.

use super::tree::{MerkleTree, NodeId};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::VecDeque;

/// Traversal orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Parent before children, children in declared order.
    PreOrder,
    /// Children before parent; the order hashing uses.
    PostOrder,
    /// Level by level.
    BreadthFirst,
    /// Post-order with each child list shuffled by a seeded PRNG. Used for
    /// parallel bottom-up hashing to reduce collisions among workers.
    RandomizedDepthFirst {
        /// PRNG seed; equal seeds give equal orders.
        seed: u64,
    },
}

/// Predicate over a node in the context of its tree.
pub type NodeFilter<'a> = Box<dyn FnMut(&MerkleTree, NodeId) -> bool + 'a>;

enum Frame {
    Enter(NodeId),
    Exit(NodeId),
}

/// Iterator over a tree in one of the four orders.
pub struct MerkleIter<'a> {
    tree: &'a MerkleTree,
    order: TraversalOrder,
    stack: Vec<Frame>,
    queue: VecDeque<NodeId>,
    rng: Option<SmallRng>,
    should_visit: Option<NodeFilter<'a>>,
    should_return: Option<NodeFilter<'a>>,
}

impl<'a> MerkleIter<'a> {
    /// Iterate the subtree under `start` (commonly the root).
    pub fn new(tree: &'a MerkleTree, start: Option<NodeId>, order: TraversalOrder) -> Self {
        let mut it = Self {
            tree,
            order,
            stack: Vec::new(),
            queue: VecDeque::new(),
            rng: match order {
                TraversalOrder::RandomizedDepthFirst { seed } => {
                    Some(SmallRng::seed_from_u64(seed))
                }
                _ => None,
            },
            should_visit: None,
            should_return: None,
        };
        if let Some(start) = start {
            match order {
                TraversalOrder::BreadthFirst => it.queue.push_back(start),
                _ => it.stack.push(Frame::Enter(start)),
            }
        }
        it
    }

    /// Replace the subtree-pruning filter.
    pub fn with_should_visit(mut self, f: NodeFilter<'a>) -> Self {
        self.should_visit = Some(f);
        self
    }

    /// Replace the node-skipping filter.
    pub fn with_should_return(mut self, f: NodeFilter<'a>) -> Self {
        self.should_return = Some(f);
        self
    }

    fn visits(&mut self, id: NodeId) -> bool {
        match &mut self.should_visit {
            Some(f) => f(self.tree, id),
            None => true,
        }
    }

    fn returns(&mut self, id: NodeId) -> bool {
        match &mut self.should_return {
            Some(f) => f(self.tree, id),
            None => true,
        }
    }

    fn children_of(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = self
            .tree
            .node(id)
            .map(|n| n.children().iter().flatten().copied().collect())
            .unwrap_or_default();
        if let Some(rng) = &mut self.rng {
            children.shuffle(rng);
        }
        children
    }

    fn next_depth_first(&mut self) -> Option<NodeId> {
        let pre = matches!(self.order, TraversalOrder::PreOrder);
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Enter(id) => {
                    if !self.visits(id) {
                        continue;
                    }
                    let children = self.children_of(id);
                    if pre {
                        for child in children.into_iter().rev() {
                            self.stack.push(Frame::Enter(child));
                        }
                        if self.returns(id) {
                            return Some(id);
                        }
                    } else {
                        self.stack.push(Frame::Exit(id));
                        for child in children.into_iter().rev() {
                            self.stack.push(Frame::Enter(child));
                        }
                    }
                }
                Frame::Exit(id) => {
                    if self.returns(id) {
                        return Some(id);
                    }
                }
            }
        }
        None
    }

    fn next_breadth_first(&mut self) -> Option<NodeId> {
        while let Some(id) = self.queue.pop_front() {
            if !self.visits(id) {
                continue;
            }
            let children = self.children_of(id);
            self.queue.extend(children);
            if self.returns(id) {
                return Some(id);
            }
        }
        None
    }
}

impl Iterator for MerkleIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        match self.order {
            TraversalOrder::BreadthFirst => self.next_breadth_first(),
            _ => self.next_depth_first(),
        }
    }
}

impl MerkleTree {
    /// Iterate from the root in the given order.
    pub fn iter(&self, order: TraversalOrder) -> MerkleIter<'_> {
        MerkleIter::new(self, self.root(), order)
    }

    /// Iterate the subtree under `start` in the given order.
    pub fn iter_from(&self, start: NodeId, order: TraversalOrder) -> MerkleIter<'_> {
        MerkleIter::new(self, Some(start), order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ser::basic::RawBytes;
    use crate::core::ser::ClassId;

    /// Builds:
    /// ```text
    ///        r
    ///       / \
    ///      i   c
    ///     / \
    ///    a   b
    /// ```
    fn sample() -> (MerkleTree, [NodeId; 5]) {
        let mut tree = MerkleTree::new();
        let r = tree.create_internal(ClassId(0xA), 1, 2);
        let i = tree.create_internal(ClassId(0xA), 1, 2);
        let a = tree.create_leaf(Box::new(RawBytes::new(b"a".to_vec())));
        let b = tree.create_leaf(Box::new(RawBytes::new(b"b".to_vec())));
        let c = tree.create_leaf(Box::new(RawBytes::new(b"c".to_vec())));
        tree.set_root(Some(r)).unwrap();
        tree.set_child(r, 0, Some(i)).unwrap();
        tree.set_child(r, 1, Some(c)).unwrap();
        tree.set_child(i, 0, Some(a)).unwrap();
        tree.set_child(i, 1, Some(b)).unwrap();
        (tree, [r, i, a, b, c])
    }

    #[test]
    fn pre_order() {
        let (tree, [r, i, a, b, c]) = sample();
        let got: Vec<_> = tree.iter(TraversalOrder::PreOrder).collect();
        assert_eq!(got, vec![r, i, a, b, c]);
    }

    #[test]
    fn post_order() {
        let (tree, [r, i, a, b, c]) = sample();
        let got: Vec<_> = tree.iter(TraversalOrder::PostOrder).collect();
        assert_eq!(got, vec![a, b, i, c, r]);
    }

    #[test]
    fn breadth_first() {
        let (tree, [r, i, a, b, c]) = sample();
        let got: Vec<_> = tree.iter(TraversalOrder::BreadthFirst).collect();
        assert_eq!(got, vec![r, i, c, a, b]);
    }

    #[test]
    fn randomized_is_seed_stable_and_complete() {
        let (tree, ids) = sample();
        let one: Vec<_> = tree
            .iter(TraversalOrder::RandomizedDepthFirst { seed: 42 })
            .collect();
        let two: Vec<_> = tree
            .iter(TraversalOrder::RandomizedDepthFirst { seed: 42 })
            .collect();
        assert_eq!(one, two);
        let mut sorted = one.clone();
        sorted.sort();
        let mut expect = ids.to_vec();
        expect.sort();
        assert_eq!(sorted, expect);
        // Children still precede parents.
        let pos = |id: NodeId| one.iter().position(|x| *x == id).unwrap();
        assert!(pos(ids[2]) < pos(ids[1]));
        assert!(pos(ids[1]) < pos(ids[0]));
    }

    #[test]
    fn should_visit_prunes_subtree() {
        let (tree, [r, i, _a, _b, c]) = sample();
        let got: Vec<_> = tree
            .iter(TraversalOrder::PreOrder)
            .with_should_visit(Box::new(move |_, id| id != i))
            .collect();
        assert_eq!(got, vec![r, c]);
    }

    #[test]
    fn should_return_skips_but_descends() {
        let (tree, [_r, _i, a, b, c]) = sample();
        let got: Vec<_> = tree
            .iter(TraversalOrder::PreOrder)
            .with_should_return(Box::new(|t, id| t.node(id).unwrap().is_leaf()))
            .collect();
        assert_eq!(got, vec![a, b, c]);
    }
}
