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

use common::{assert_trees_equal, leaf, registry, INTERNAL_CLASS};
use std::io::Cursor;
use tributary::core::merkle::hashing::hash_tree;
use tributary::core::merkle::io::{deserialize_tree, serialize_tree, SerializableOptions};
use tributary::core::merkle::iterators::TraversalOrder;
use tributary::core::merkle::MerkleTree;
use tributary::core::ser::basic::RawBytes;
use tributary::core::ser::NULL_CLASS_ID;

#[test]
fn two_leaf_tree_serializes_to_three_preorder_records_with_digests() {
    // internal(children = [leaf 7, leaf 8]), write_hashes on.
    let mut tree = MerkleTree::new();
    let root = tree.create_internal(INTERNAL_CLASS, 1, 2);
    let a = leaf(&mut tree, b"7");
    let b = leaf(&mut tree, b"8");
    tree.set_root(Some(root)).unwrap();
    tree.set_child(root, 0, Some(a)).unwrap();
    tree.set_child(root, 1, Some(b)).unwrap();
    hash_tree(&mut tree).unwrap();

    let mut buf = Vec::new();
    serialize_tree(
        &mut buf,
        &tree,
        SerializableOptions {
            external: false,
            write_hashes: true,
        },
        None,
    )
    .unwrap();

    // Count class-id fields to count records: header is 13 bytes
    // (i32 version + i64 options + u8 root flag).
    let mut records = Vec::new();
    let mut offset = 13;
    // Root record: class id + version + child count + digest.
    records.push(i64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap()));
    offset += 8 + 4 + 4 + 48;
    // Leaf record: class id + version + payload (i32 len + 1 byte) + digest.
    records.push(i64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap()));
    offset += 8 + 4 + 4 + 1 + 48;
    records.push(i64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap()));
    offset += 8 + 4 + 4 + 1 + 48;
    assert_eq!(offset, buf.len(), "exactly three records");
    assert_eq!(records[0], INTERNAL_CLASS.0);
    assert_eq!(records[1], RawBytes::CLASS_ID.0);
    assert_eq!(records[2], RawBytes::CLASS_ID.0);

    // Rebuild and verify shape, routes and attached digests.
    let reg = registry();
    let (got, _) = deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 16, None).unwrap();
    assert_trees_equal(&tree, &got);
    for id in got.iter(TraversalOrder::PreOrder) {
        assert!(got.node(id).unwrap().hash().is_some());
    }
}

#[test]
fn roundtrip_preserves_routes_and_absent_children() {
    let mut tree = MerkleTree::new();
    let root = tree.create_internal(INTERNAL_CLASS, 1, 3);
    let inner = tree.create_internal(INTERNAL_CLASS, 1, 2);
    let a = leaf(&mut tree, b"a");
    let b = leaf(&mut tree, b"deep");
    tree.set_root(Some(root)).unwrap();
    tree.set_child(root, 0, Some(a)).unwrap();
    tree.set_child(root, 2, Some(inner)).unwrap();
    tree.set_child(inner, 1, Some(b)).unwrap();
    hash_tree(&mut tree).unwrap();

    let mut buf = Vec::new();
    serialize_tree(
        &mut buf,
        &tree,
        SerializableOptions {
            external: false,
            write_hashes: true,
        },
        None,
    )
    .unwrap();
    let reg = registry();
    let (got, _) = deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 16, None).unwrap();
    assert_trees_equal(&tree, &got);

    let groot = got.root().unwrap();
    let children = got.node(groot).unwrap().children().to_vec();
    assert!(children[1].is_none());
    let ginner = children[2].unwrap();
    assert_eq!(got.node(ginner).unwrap().route().to_string(), "/2");
    let gb = got.node(ginner).unwrap().children()[1].unwrap();
    assert_eq!(got.node(gb).unwrap().route().to_string(), "/2/1");
}

#[test]
fn null_root_stream_is_header_only() {
    let tree = MerkleTree::new();
    let mut buf = Vec::new();
    serialize_tree(&mut buf, &tree, SerializableOptions::default(), None).unwrap();
    assert_eq!(buf.len(), 13);
    let reg = registry();
    let (got, _) = deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 4, None).unwrap();
    assert!(got.root().is_none());
}

#[test]
fn placeholder_class_id_is_the_reserved_sentinel() {
    let mut tree = MerkleTree::new();
    let root = tree.create_internal(INTERNAL_CLASS, 1, 1);
    tree.set_root(Some(root)).unwrap();
    let mut buf = Vec::new();
    serialize_tree(&mut buf, &tree, SerializableOptions::default(), None).unwrap();
    // Header, root record (class id + version + child count), placeholder.
    let placeholder_offset = 13 + 8 + 4 + 4;
    let raw = i64::from_be_bytes(
        buf[placeholder_offset..placeholder_offset + 8]
            .try_into()
            .unwrap(),
    );
    assert_eq!(raw, NULL_CLASS_ID.0);
}

#[test]
fn write_hashes_requires_a_hashed_tree() {
    let mut tree = MerkleTree::new();
    let root = tree.create_internal(INTERNAL_CLASS, 1, 1);
    tree.set_root(Some(root)).unwrap();
    let mut buf = Vec::new();
    let err = serialize_tree(
        &mut buf,
        &tree,
        SerializableOptions {
            external: false,
            write_hashes: true,
        },
        None,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        tributary::core::merkle::MerkleError::Serialization(_)
    ));
}
