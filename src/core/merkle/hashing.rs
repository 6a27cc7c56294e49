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

//! Lazy SHA-384 hashing of merkle trees.
//!
//! leaf = H( "Tributary-Merkle-Leaf-v1" || class_id || version || payload )
//! node = H( "Tributary-Merkle-Node-v1" || class_id || version || child digests )
//!
//! Absent children contribute the zero digest. The digest is a pure function
//! of structure and payloads, so any traversal order yields the same root.

use super::iterators::{MerkleIter, TraversalOrder};
use super::tree::{MerkleTree, NodeId};
use super::{MerkleError, MerkleResult};
use crate::core::ser::serializable::serialize_to_vec;
use crate::core::ser::ClassId;
use crate::core::types::{Digest, DIGEST_LENGTH};
use ring::digest;

const LEAF_DOMAIN: &[u8] = b"Tributary-Merkle-Leaf-v1";
const NODE_DOMAIN: &[u8] = b"Tributary-Merkle-Node-v1";

fn finish(ctx: digest::Context) -> Digest {
    let d = ctx.finish();
    let mut out = [0u8; DIGEST_LENGTH];
    out.copy_from_slice(d.as_ref());
    Digest::from_bytes(out)
}

/// SHA-384 of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> Digest {
    let mut ctx = digest::Context::new(&digest::SHA384);
    ctx.update(data);
    finish(ctx)
}

/// Digest of a leaf from its identity and payload bytes.
pub fn leaf_digest(class_id: ClassId, version: i32, payload: &[u8]) -> Digest {
    let mut ctx = digest::Context::new(&digest::SHA384);
    ctx.update(LEAF_DOMAIN);
    ctx.update(&class_id.0.to_be_bytes());
    ctx.update(&version.to_be_bytes());
    ctx.update(payload);
    finish(ctx)
}

/// Digest of an internal node from its identity and ordered child digests.
pub fn internal_digest(class_id: ClassId, version: i32, children: &[Digest]) -> Digest {
    let mut ctx = digest::Context::new(&digest::SHA384);
    ctx.update(NODE_DOMAIN);
    ctx.update(&class_id.0.to_be_bytes());
    ctx.update(&version.to_be_bytes());
    for child in children {
        ctx.update(child.as_bytes());
    }
    finish(ctx)
}

fn node_digest(tree: &MerkleTree, id: NodeId, children: &[Digest]) -> MerkleResult<Digest> {
    let node = tree.node(id)?;
    if let Some(value) = node.value() {
        let payload = serialize_to_vec(value)?;
        Ok(leaf_digest(node.class_id(), node.version(), &payload))
    } else {
        Ok(internal_digest(node.class_id(), node.version(), children))
    }
}

/// Compute the digest of every unhashed node under `id`, post-order, and
/// return the subtree digest.
///
/// Nodes that already carry a hash are trusted and not descended into. A
/// self-hashing leaf without a hash is an invariant violation.
pub fn hash_subtree(tree: &mut MerkleTree, id: NodeId) -> MerkleResult<Digest> {
    // Iterative post-order; digests of completed children accumulate per frame.
    enum Frame {
        Enter(NodeId),
        Finish { id: NodeId, child_count: usize },
    }
    let mut stack = vec![Frame::Enter(id)];
    let mut digests: Vec<Digest> = Vec::new();
    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(id) => {
                let node = tree.node(id)?;
                if let Some(hash) = node.hash() {
                    digests.push(hash);
                    continue;
                }
                if node.is_self_hashing() {
                    return Err(MerkleError::SelfHashingWithoutHash(id));
                }
                let children: Vec<Option<NodeId>> = node.children().to_vec();
                stack.push(Frame::Finish {
                    id,
                    child_count: children.len(),
                });
                // Children complete left to right; reversal keeps pops ordered.
                for child in children.into_iter().rev() {
                    match child {
                        Some(child) => stack.push(Frame::Enter(child)),
                        None => stack.push(Frame::Finish {
                            id: NodeId(u32::MAX),
                            child_count: usize::MAX,
                        }),
                    }
                }
            }
            Frame::Finish { id, child_count } => {
                if child_count == usize::MAX {
                    // Absent child placeholder.
                    digests.push(Digest::ZERO);
                    continue;
                }
                let children = digests.split_off(digests.len() - child_count);
                let digest = node_digest(tree, id, &children)?;
                tree.set_hash(id, digest)?;
                digests.push(digest);
            }
        }
    }
    debug_assert_eq!(digests.len(), 1);
    digests
        .pop()
        .ok_or_else(|| MerkleError::Serialization("empty hash stack".to_string()))
}

/// Post-order scan of the nodes that still need a digest.
///
/// Subtrees that already carry one are pruned; a self-hashing leaf without
/// its digest is an invariant violation. Callers sharding bottom-up hashing
/// across workers pair this with the randomized traversal order.
pub fn unhashed_nodes(tree: &MerkleTree) -> MerkleResult<Vec<NodeId>> {
    let mut violation: Option<NodeId> = None;
    let ids: Vec<NodeId> = {
        MerkleIter::new(tree, tree.root(), TraversalOrder::PostOrder)
            .with_should_visit(Box::new(|t, id| {
                t.node(id).map(|n| n.hash().is_none()).unwrap_or(false)
            }))
            .with_should_return(Box::new(|t, id| match t.node(id) {
                Ok(n) if n.is_self_hashing() && n.hash().is_none() => {
                    violation = Some(id);
                    false
                }
                Ok(n) => n.hash().is_none(),
                Err(_) => false,
            }))
            .collect()
    };
    if let Some(id) = violation {
        return Err(MerkleError::SelfHashingWithoutHash(id));
    }
    Ok(ids)
}

/// Hash the whole tree; `None` for an empty tree.
pub fn hash_tree(tree: &mut MerkleTree) -> MerkleResult<Option<Digest>> {
    match tree.root() {
        Some(root) => Ok(Some(hash_subtree(tree, root)?)),
        None => Ok(None),
    }
}

/// Parallel variant of [`hash_tree`]; bit-identical result.
///
/// Digests are computed over a read-only view with rayon and written back in
/// a second pass.
pub fn hash_tree_parallel(tree: &mut MerkleTree) -> MerkleResult<Option<Digest>> {
    let Some(root) = tree.root() else {
        return Ok(None);
    };
    let (digest, computed) = compute_parallel(tree, root)?;
    for (id, digest) in computed {
        tree.set_hash(id, digest)?;
    }
    Ok(Some(digest))
}

type Computed = Vec<(NodeId, Digest)>;

fn compute_parallel(tree: &MerkleTree, id: NodeId) -> MerkleResult<(Digest, Computed)> {
    let node = tree.node(id)?;
    if let Some(hash) = node.hash() {
        return Ok((hash, Vec::new()));
    }
    if node.is_self_hashing() {
        return Err(MerkleError::SelfHashingWithoutHash(id));
    }
    let children = node.children();
    if children.is_empty() && node.is_leaf() {
        let digest = node_digest(tree, id, &[])?;
        return Ok((digest, vec![(id, digest)]));
    }
    let results: Vec<MerkleResult<(Digest, Computed)>> = {
        use rayon::prelude::*;
        children
            .par_iter()
            .map(|child| match child {
                Some(child) => compute_parallel(tree, *child),
                None => Ok((Digest::ZERO, Vec::new())),
            })
            .collect()
    };
    let mut child_digests = Vec::with_capacity(results.len());
    let mut computed: Computed = Vec::new();
    for result in results {
        let (digest, mut sub) = result?;
        child_digests.push(digest);
        computed.append(&mut sub);
    }
    let digest = node_digest(tree, id, &child_digests)?;
    computed.push((id, digest));
    Ok((digest, computed))
}
