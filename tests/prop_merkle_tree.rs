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

mod common;

use common::{assert_trees_equal, registry, INTERNAL_CLASS};
use proptest::prelude::*;
use std::io::Cursor;
use tributary::core::merkle::hashing::{hash_tree, hash_tree_parallel};
use tributary::core::merkle::io::{deserialize_tree, serialize_tree, SerializableOptions};
use tributary::core::merkle::{MerkleTree, NodeId};
use tributary::core::ser::basic::RawBytes;

/// Recipe for a small random tree: for every internal node, a list of child
/// kinds (None = absent, Some(true) = leaf, Some(false) = internal fed from
/// the recipe tail).
#[derive(Clone, Debug)]
struct Recipe {
    slots: Vec<Vec<Option<bool>>>,
    payloads: Vec<u8>,
}

fn recipe() -> impl Strategy<Value = Recipe> {
    (
        prop::collection::vec(
            prop::collection::vec(prop::option::of(any::<bool>()), 0..4),
            1..8,
        ),
        prop::collection::vec(any::<u8>(), 1..32),
    )
        .prop_map(|(slots, payloads)| Recipe { slots, payloads })
}

/// Deterministically expand a recipe into a tree.
fn build(recipe: &Recipe) -> MerkleTree {
    let mut tree = MerkleTree::new();
    // (node, recipe row it was built from)
    let mut internals: Vec<(NodeId, usize)> = Vec::new();
    let mut next_row = 0usize;
    let mut next_payload = 0usize;

    let root = tree.create_internal(INTERNAL_CLASS, 1, recipe.slots[0].len());
    tree.set_root(Some(root)).unwrap();
    internals.push((root, 0));
    next_row += 1;

    let mut cursor = 0usize;
    while cursor < internals.len() {
        let (parent, row) = internals[cursor];
        cursor += 1;
        for (index, kind) in recipe.slots[row].clone().into_iter().enumerate() {
            match kind {
                None => {}
                Some(true) => {
                    let byte = recipe.payloads[next_payload % recipe.payloads.len()];
                    next_payload += 1;
                    let leaf =
                        tree.create_leaf(Box::new(RawBytes::new(vec![byte, index as u8])));
                    tree.set_child(parent, index, Some(leaf)).unwrap();
                }
                Some(false) => {
                    if next_row < recipe.slots.len() {
                        let child = tree.create_internal(
                            INTERNAL_CLASS,
                            1,
                            recipe.slots[next_row].len(),
                        );
                        tree.set_child(parent, index, Some(child)).unwrap();
                        internals.push((child, next_row));
                        next_row += 1;
                    }
                }
            }
        }
    }
    tree
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn serialize_deserialize_is_identity(recipe in recipe()) {
        let mut tree = build(&recipe);
        hash_tree(&mut tree).unwrap();

        let mut buf = Vec::new();
        serialize_tree(
            &mut buf,
            &tree,
            SerializableOptions { external: false, write_hashes: true },
            None,
        )
        .unwrap();
        let reg = registry();
        let (got, _) = deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 4096, None).unwrap();
        assert_trees_equal(&tree, &got);
    }

    #[test]
    fn root_digest_is_traversal_independent(recipe in recipe()) {
        // Sequential and parallel hashing of structurally equal trees agree.
        let mut sequential = build(&recipe);
        let mut parallel = build(&recipe);
        let a = hash_tree(&mut sequential).unwrap();
        let b = hash_tree_parallel(&mut parallel).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn payload_change_changes_the_root_digest(recipe in recipe()) {
        let mut tree = build(&recipe);
        let before = hash_tree(&mut tree).unwrap().unwrap();

        // Replace the first leaf (if any) with different bytes.
        use tributary::core::merkle::iterators::TraversalOrder;
        let target = tree
            .iter(TraversalOrder::PreOrder)
            .find(|id| tree.node(*id).unwrap().is_leaf());
        prop_assume!(target.is_some());
        let target = target.unwrap();
        let route = tree.node(target).unwrap().route().clone();
        let parent_route = route.parent().unwrap();
        let parent = tree.node_at_route(&parent_route).unwrap();
        let slot = *route.steps().last().unwrap() as usize;

        let replacement = tree.create_leaf(Box::new(RawBytes::new(b"mutated".to_vec())));
        tree.set_child(parent, slot, Some(replacement)).unwrap();
        let after = hash_tree(&mut tree).unwrap().unwrap();
        prop_assert_ne!(before, after);
    }
}
