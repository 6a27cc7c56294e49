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

//! Persisted state directories.
//!
//! A state directory holds the framed tree (digests attached) in one file,
//! plus one sibling file per externally-serialized leaf, named by the leaf's
//! content hash. Readers are handed the directory so external payloads
//! resolve next to the tree file.

use super::hashing::hash_tree;
use super::io::{deserialize_tree, serialize_tree, SerializableOptions};
use super::tree::MerkleTree;
use super::{MerkleError, MerkleResult};
use crate::core::codec::StreamError;
use crate::core::ser::ConstructableRegistry;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// File holding the framed tree inside a state directory.
pub const STATE_FILE_NAME: &str = "state.tree";

/// Persist the tree into `dir`, hashing it first if needed.
///
/// Writes `state.tree` with digests attached and external leaf payloads as
/// sibling files.
pub fn write_state_directory(dir: &Path, tree: &mut MerkleTree) -> MerkleResult<()> {
    hash_tree(tree)?;
    std::fs::create_dir_all(dir).map_err(StreamError::from)?;
    let file = File::create(dir.join(STATE_FILE_NAME)).map_err(StreamError::from)?;
    let mut writer = BufWriter::new(file);
    serialize_tree(
        &mut writer,
        tree,
        SerializableOptions {
            external: true,
            write_hashes: true,
        },
        Some(dir),
    )?;
    writer.flush().map_err(StreamError::from)?;
    info!(dir = %dir.display(), nodes = tree.len(), "state written");
    Ok(())
}

/// Load a tree persisted by [`write_state_directory`].
pub fn read_state_directory(
    dir: &Path,
    registry: &ConstructableRegistry,
    max_nodes: usize,
) -> MerkleResult<MerkleTree> {
    let file = File::open(dir.join(STATE_FILE_NAME)).map_err(StreamError::from)?;
    let mut reader = BufReader::new(file);
    let (tree, options) = deserialize_tree(&mut reader, registry, max_nodes, Some(dir))?;
    if !options.write_hashes {
        return Err(MerkleError::Serialization(
            "state file carries no digests".to_string(),
        ));
    }
    info!(dir = %dir.display(), nodes = tree.len(), "state loaded");
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::merkle::iterators::TraversalOrder;
    use crate::core::ser::basic::RawBytes;
    use crate::core::ser::{ClassId, InternalClass};

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

    #[test]
    fn state_directory_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = MerkleTree::new();
        let root = tree.create_internal(ClassId(0xA), 1, 2);
        let a = tree.create_leaf(Box::new(RawBytes::new(b"left".to_vec())));
        let b = tree.create_leaf(Box::new(RawBytes::new(b"right".to_vec())));
        tree.set_root(Some(root)).unwrap();
        tree.set_child(root, 0, Some(a)).unwrap();
        tree.set_child(root, 1, Some(b)).unwrap();

        write_state_directory(dir.path(), &mut tree).unwrap();
        let reg = registry();
        let got = read_state_directory(dir.path(), &reg, 64).unwrap();

        let want: Vec<_> = tree.iter(TraversalOrder::PreOrder).collect();
        let have: Vec<_> = got.iter(TraversalOrder::PreOrder).collect();
        assert_eq!(want.len(), have.len());
        for (x, y) in want.iter().zip(have.iter()) {
            assert_eq!(
                tree.node(*x).unwrap().hash(),
                got.node(*y).unwrap().hash()
            );
            assert_eq!(tree.node(*x).unwrap().route(), got.node(*y).unwrap().route());
        }
    }

    #[test]
    fn missing_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry();
        assert!(read_state_directory(dir.path(), &reg, 64).is_err());
    }
}
