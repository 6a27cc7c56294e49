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

//! Whole-tree serialization.
//!
//! ```text
//! [protocol_version : i32]
//! [options          : i64 bitmask]   bit0 external, bit1 write_hashes
//! [root_is_null     : u8]
//! ( node_record )*                   pre-order, parent before children
//! ```
//!
//! Per-node record: class id, version, then the leaf payload (or the content
//! hash of an externally stored payload) or the child count; the node digest
//! follows its own fields when `write_hashes` is set, before the children's
//! records. `NULL_CLASS_ID` records are placeholders for absent children.

use super::hashing::hash_bytes;
use super::tree::{MerkleTree, NodeId};
use super::{MerkleError, MerkleResult};
use crate::core::ser::serializable::serialize_to_vec;
use crate::core::ser::{ClassId, ConstructableRegistry, Registration, SerError, NULL_CLASS_ID};
use crate::core::codec::streams::read_marker_i32;
use crate::core::codec::StreamError;
use crate::core::types::{Digest, DIGEST_LENGTH};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::path::Path;

/// Current (and only) tree stream version.
pub const TREE_PROTOCOL_VERSION: i32 = 3;

const OPTION_EXTERNAL: i64 = 1;
const OPTION_WRITE_HASHES: i64 = 1 << 1;

/// Flags governing a whole-tree stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SerializableOptions {
    /// Leaves that declare external payloads store them as sibling files
    /// addressed by content hash.
    pub external: bool,
    /// Every node record carries the node's digest.
    pub write_hashes: bool,
}

impl SerializableOptions {
    fn to_bits(self) -> i64 {
        let mut bits = 0;
        if self.external {
            bits |= OPTION_EXTERNAL;
        }
        if self.write_hashes {
            bits |= OPTION_WRITE_HASHES;
        }
        bits
    }

    fn from_bits(bits: i64) -> MerkleResult<Self> {
        if bits & !(OPTION_EXTERNAL | OPTION_WRITE_HASHES) != 0 {
            return Err(MerkleError::Serialization(format!(
                "unknown option bits {bits:#x}"
            )));
        }
        Ok(Self {
            external: bits & OPTION_EXTERNAL != 0,
            write_hashes: bits & OPTION_WRITE_HASHES != 0,
        })
    }
}

/// Write a 48-byte digest raw.
pub fn write_digest(w: &mut dyn Write, digest: &Digest) -> MerkleResult<()> {
    w.write_all(digest.as_bytes()).map_err(StreamError::from)?;
    Ok(())
}

/// Read a 48-byte digest raw.
pub fn read_digest(r: &mut dyn Read) -> MerkleResult<Digest> {
    let mut buf = [0u8; DIGEST_LENGTH];
    r.read_exact(&mut buf).map_err(StreamError::from)?;
    Ok(Digest::from_bytes(buf))
}

fn external_file(dir: &Path, digest: &Digest) -> std::path::PathBuf {
    dir.join(digest.to_hex())
}

/// Serialize the whole tree pre-order.
///
/// `dir` receives external leaf payloads and is required when
/// `options.external` is set; `options.write_hashes` requires a fully hashed
/// tree.
pub fn serialize_tree(
    w: &mut dyn Write,
    tree: &MerkleTree,
    options: SerializableOptions,
    dir: Option<&Path>,
) -> MerkleResult<()> {
    if options.external && dir.is_none() {
        return Err(MerkleError::Serialization(
            "external serialization requires a state directory".to_string(),
        ));
    }
    w.write_i32::<BigEndian>(TREE_PROTOCOL_VERSION)
        .map_err(StreamError::from)?;
    w.write_i64::<BigEndian>(options.to_bits())
        .map_err(StreamError::from)?;
    let root = tree.root();
    w.write_u8(u8::from(root.is_none()))
        .map_err(StreamError::from)?;
    let Some(root) = root else {
        return Ok(());
    };

    let mut stack: Vec<Option<NodeId>> = vec![Some(root)];
    while let Some(entry) = stack.pop() {
        let Some(id) = entry else {
            w.write_i64::<BigEndian>(NULL_CLASS_ID.0)
                .map_err(StreamError::from)?;
            continue;
        };
        let node = tree.node(id)?;
        w.write_i64::<BigEndian>(node.class_id().0)
            .map_err(StreamError::from)?;
        w.write_i32::<BigEndian>(node.version())
            .map_err(StreamError::from)?;
        if let Some(value) = node.value() {
            if options.external && value.is_external() {
                let Some(dir) = dir else {
                    return Err(MerkleError::Serialization(
                        "external serialization requires a state directory".to_string(),
                    ));
                };
                let payload = serialize_to_vec(value)?;
                let content = hash_bytes(&payload);
                write_digest(w, &content)?;
                std::fs::write(external_file(dir, &content), payload)
                    .map_err(StreamError::from)?;
            } else {
                value.serialize(w)?;
            }
        } else {
            w.write_i32::<BigEndian>(node.children().len() as i32)
                .map_err(StreamError::from)?;
        }
        if options.write_hashes {
            let digest = node.hash().ok_or_else(|| {
                MerkleError::Serialization(format!(
                    "write_hashes requires a hashed tree, node {id} has none"
                ))
            })?;
            write_digest(w, &digest)?;
        }
        for child in node.children().iter().rev() {
            stack.push(*child);
        }
    }
    Ok(())
}

struct Pending {
    id: NodeId,
    child_count: usize,
    next_index: usize,
}

/// Rebuild a tree from a stream written by [`serialize_tree`].
///
/// `max_nodes` bounds the number of node records; `dir` resolves external
/// leaf payloads.
pub fn deserialize_tree(
    r: &mut dyn Read,
    registry: &ConstructableRegistry,
    max_nodes: usize,
    dir: Option<&Path>,
) -> MerkleResult<(MerkleTree, SerializableOptions)> {
    read_marker_i32(r, "tree protocol version", TREE_PROTOCOL_VERSION)
        .map_err(MerkleError::Stream)?;
    let options = SerializableOptions::from_bits(
        r.read_i64::<BigEndian>().map_err(StreamError::from)?,
    )?;
    if options.external && dir.is_none() {
        return Err(MerkleError::Serialization(
            "external deserialization requires a state directory".to_string(),
        ));
    }
    let root_is_null = r.read_u8().map_err(StreamError::from)? != 0;
    let mut tree = MerkleTree::new();
    if root_is_null {
        return Ok((tree, options));
    }

    let mut stack: Vec<Pending> = Vec::new();
    let mut digests: Vec<(NodeId, Digest)> = Vec::new();
    let mut root_set = false;
    let mut nodes_read = 0usize;
    loop {
        nodes_read += 1;
        if nodes_read > max_nodes {
            return Err(MerkleError::MaxNodesExceeded { max: max_nodes });
        }
        let class_raw = r.read_i64::<BigEndian>().map_err(StreamError::from)?;
        let mut pending_children = 0usize;
        let node: Option<NodeId> = if class_raw == NULL_CLASS_ID.0 {
            None
        } else {
            let class_id = ClassId(class_raw);
            match registry.lookup(class_id)? {
                Registration::Value(_) => {
                    let version = r.read_i32::<BigEndian>().map_err(StreamError::from)?;
                    let mut instance = registry.construct(class_id)?;
                    let (min, max) =
                        (instance.minimum_supported_version(), instance.version());
                    if version < min || version > max {
                        return Err(SerError::IllegalVersion {
                            class_id,
                            version,
                            min,
                            max,
                        }
                        .into());
                    }
                    if options.external && instance.is_external() {
                        let Some(dir) = dir else {
                            return Err(MerkleError::Serialization(
                                "external deserialization requires a state directory"
                                    .to_string(),
                            ));
                        };
                        let content = read_digest(r)?;
                        let payload = std::fs::read(external_file(dir, &content))
                            .map_err(|_| MerkleError::ExternalPayloadMissing(content))?;
                        instance.deserialize(&mut Cursor::new(payload), version)?;
                    } else {
                        instance.deserialize(r, version)?;
                    }
                    let id = tree.create_leaf(instance);
                    if options.write_hashes {
                        digests.push((id, read_digest(r)?));
                    }
                    Some(id)
                }
                Registration::Internal(class) => {
                    let version = r.read_i32::<BigEndian>().map_err(StreamError::from)?;
                    class.check_version(class_id, version)?;
                    let raw_count = r.read_i32::<BigEndian>().map_err(StreamError::from)?;
                    let (min, max) = (class.child_bounds)(version);
                    if raw_count < 0
                        || (raw_count as usize) < min
                        || (raw_count as usize) > max
                        || raw_count as usize > max_nodes
                    {
                        return Err(MerkleError::IllegalChildCount {
                            class_id,
                            version,
                            count: raw_count as i64,
                            min,
                            max,
                        });
                    }
                    pending_children = raw_count as usize;
                    let id = tree.create_internal(class_id, version, pending_children);
                    if options.write_hashes {
                        digests.push((id, read_digest(r)?));
                    }
                    Some(id)
                }
            }
        };

        if !root_set {
            let Some(id) = node else {
                return Err(MerkleError::Serialization(
                    "null placeholder at root position".to_string(),
                ));
            };
            tree.set_root(Some(id))?;
            root_set = true;
        } else {
            let top = stack.last_mut().ok_or_else(|| {
                MerkleError::Serialization("record after tree completed".to_string())
            })?;
            let index = top.next_index;
            top.next_index += 1;
            let parent = top.id;
            tree.set_child(parent, index, node)?;
        }

        if let Some(id) = node {
            if pending_children > 0 {
                stack.push(Pending {
                    id,
                    child_count: pending_children,
                    next_index: 0,
                });
                continue;
            }
        }
        while let Some(top) = stack.last() {
            if top.next_index == top.child_count {
                stack.pop();
            } else {
                break;
            }
        }
        if stack.is_empty() {
            break;
        }
    }

    for (id, digest) in digests {
        tree.set_hash(id, digest)?;
    }
    Ok((tree, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::merkle::hashing::hash_tree;
    use crate::core::merkle::iterators::TraversalOrder;
    use crate::core::ser::basic::RawBytes;
    use crate::core::ser::InternalClass;

    fn registry() -> ConstructableRegistry {
        let reg = ConstructableRegistry::new();
        reg.register_value(RawBytes::CLASS_ID, RawBytes::construct)
            .unwrap();
        reg.register_internal(
            ClassId(0xA),
            InternalClass {
                version: 1,
                minimum_supported_version: 1,
                child_bounds: |_| (0, 8),
            },
        )
        .unwrap();
        reg
    }

    fn sample_tree() -> MerkleTree {
        let mut tree = MerkleTree::new();
        let root = tree.create_internal(ClassId(0xA), 1, 2);
        let a = tree.create_leaf(Box::new(RawBytes::new(b"7".to_vec())));
        let b = tree.create_leaf(Box::new(RawBytes::new(b"8".to_vec())));
        tree.set_root(Some(root)).unwrap();
        tree.set_child(root, 0, Some(a)).unwrap();
        tree.set_child(root, 1, Some(b)).unwrap();
        tree
    }

    fn trees_equal(a: &MerkleTree, b: &MerkleTree) {
        let av: Vec<_> = a.iter(TraversalOrder::PreOrder).collect();
        let bv: Vec<_> = b.iter(TraversalOrder::PreOrder).collect();
        assert_eq!(av.len(), bv.len());
        for (x, y) in av.iter().zip(bv.iter()) {
            let nx = a.node(*x).unwrap();
            let ny = b.node(*y).unwrap();
            assert_eq!(nx.class_id(), ny.class_id());
            assert_eq!(nx.version(), ny.version());
            assert_eq!(nx.route(), ny.route());
            assert_eq!(nx.children().len(), ny.children().len());
            assert_eq!(nx.hash(), ny.hash());
        }
    }

    #[test]
    fn roundtrip_with_hashes() {
        let reg = registry();
        let mut tree = sample_tree();
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

        let (got, options) =
            deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 1024, None).unwrap();
        assert!(options.write_hashes);
        trees_equal(&tree, &got);
    }

    #[test]
    fn null_root_roundtrip() {
        let reg = registry();
        let tree = MerkleTree::new();
        let mut buf = Vec::new();
        serialize_tree(&mut buf, &tree, SerializableOptions::default(), None).unwrap();
        let (got, _) = deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 16, None).unwrap();
        assert!(got.root().is_none());
    }

    #[test]
    fn absent_child_placeholder_roundtrip() {
        let reg = registry();
        let mut tree = MerkleTree::new();
        let root = tree.create_internal(ClassId(0xA), 1, 3);
        let a = tree.create_leaf(Box::new(RawBytes::new(b"x".to_vec())));
        tree.set_root(Some(root)).unwrap();
        tree.set_child(root, 1, Some(a)).unwrap();

        let mut buf = Vec::new();
        serialize_tree(&mut buf, &tree, SerializableOptions::default(), None).unwrap();
        let (got, _) = deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 16, None).unwrap();
        let groot = got.root().unwrap();
        let children = got.node(groot).unwrap().children().to_vec();
        assert_eq!(children.len(), 3);
        assert!(children[0].is_none());
        assert!(children[1].is_some());
        assert!(children[2].is_none());
    }

    #[test]
    fn max_nodes_is_enforced() {
        let reg = registry();
        let mut tree = sample_tree();
        hash_tree(&mut tree).unwrap();
        let mut buf = Vec::new();
        serialize_tree(&mut buf, &tree, SerializableOptions::default(), None).unwrap();
        let err = deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 2, None).unwrap_err();
        assert!(matches!(err, MerkleError::MaxNodesExceeded { max: 2 }));
    }

    #[test]
    fn child_count_outside_bounds_is_rejected() {
        let reg = ConstructableRegistry::new();
        reg.register_value(RawBytes::CLASS_ID, RawBytes::construct)
            .unwrap();
        reg.register_internal(
            ClassId(0xA),
            InternalClass {
                version: 1,
                minimum_supported_version: 1,
                child_bounds: |_| (2, 2),
            },
        )
        .unwrap();

        // Header + a root internal claiming 3 children.
        let mut buf = Vec::new();
        buf.extend_from_slice(&TREE_PROTOCOL_VERSION.to_be_bytes());
        buf.extend_from_slice(&0i64.to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(&0xAi64.to_be_bytes());
        buf.extend_from_slice(&1i32.to_be_bytes());
        buf.extend_from_slice(&3i32.to_be_bytes());
        let err = deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 16, None).unwrap_err();
        assert!(matches!(err, MerkleError::IllegalChildCount { .. }));
    }

    #[test]
    fn external_leaves_use_sibling_files() {
        #[derive(Clone, Debug, Default)]
        struct ExternalBlob(RawBytes);
        impl crate::core::ser::SelfSerializable for ExternalBlob {
            fn class_id(&self) -> ClassId {
                ClassId(0xE0)
            }
            fn version(&self) -> i32 {
                1
            }
            fn serialize(&self, w: &mut dyn Write) -> crate::core::ser::SerResult<()> {
                self.0.serialize(w)
            }
            fn deserialize(
                &mut self,
                r: &mut dyn Read,
                version: i32,
            ) -> crate::core::ser::SerResult<()> {
                self.0.deserialize(r, version)
            }
            fn clone_box(&self) -> Box<dyn crate::core::ser::SelfSerializable> {
                Box::new(self.clone())
            }
            fn is_external(&self) -> bool {
                true
            }
        }

        let reg = registry();
        reg.register_value(ClassId(0xE0), || Box::<ExternalBlob>::default())
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut tree = MerkleTree::new();
        let root = tree.create_internal(ClassId(0xA), 1, 1);
        let leaf = tree.create_leaf(Box::new(ExternalBlob(RawBytes::new(b"bulk".to_vec()))));
        tree.set_root(Some(root)).unwrap();
        tree.set_child(root, 0, Some(leaf)).unwrap();

        let options = SerializableOptions {
            external: true,
            write_hashes: false,
        };
        let mut buf = Vec::new();
        serialize_tree(&mut buf, &tree, options, Some(dir.path())).unwrap();

        // One sibling file, named by content hash.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let (got, _) =
            deserialize_tree(&mut Cursor::new(&buf[..]), &reg, 16, Some(dir.path())).unwrap();
        let groot = got.root().unwrap();
        let child = got.node(groot).unwrap().children()[0].unwrap();
        let value = got.node(child).unwrap().value().unwrap();
        let bytes = crate::core::ser::serialize_to_vec(value).unwrap();
        let mut expect = Vec::new();
        crate::core::codec::streams::write_byte_array(&mut expect, Some(b"bulk"), false).unwrap();
        assert_eq!(bytes, expect);
    }
}
