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

//! Learning side of the merkle synchronizer.
//!
//! The learner answers every digest offer with a one-byte ack: affirmative
//! when its own tree already holds a subtree with that digest (the matching
//! subtree is then grafted locally and never travels), negative otherwise.
//! Expected positions form a FIFO that mirrors the teacher's send order.

use super::messages::{read_node_message, write_ack, NodeDataMessage};
use super::pump::{spawn_reader, spawn_writer};
use super::{SyncError, SyncResult, SyncSummary};
use crate::core::codec::extensions::{ByteCounter, CountingReader, CountingWriter};
use crate::core::codec::StreamError;
use crate::core::config::SyncConfig;
use crate::core::merkle::hashing::hash_tree;
use crate::core::merkle::io::read_digest;
use crate::core::merkle::iterators::TraversalOrder;
use crate::core::merkle::{MerkleResult, MerkleTree, NodeId};
use crate::core::ser::ConstructableRegistry;
use crate::core::types::Digest;
use crate::monitoring::metrics::Metrics;
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use tracing::{debug, info, warn};

struct Expected {
    /// Attachment point in the reconstructed tree; `None` for the root.
    parent: Option<(NodeId, usize)>,
    /// Digest the teacher offered for this position.
    digest: Digest,
    /// The answer this side gave to the offer.
    already_have: bool,
}

/// Reconstruct the teacher's tree, reusing matching subtrees of `own`.
///
/// `own` must be fully hashed (its digests answer the offers). Returns the
/// reconstructed tree and the run's byte and message counts.
pub fn learn<R, W>(
    own: &MerkleTree,
    reader: R,
    writer: W,
    registry: &ConstructableRegistry,
    config: &SyncConfig,
    metrics: Option<&Metrics>,
) -> SyncResult<(MerkleTree, SyncSummary)>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let bytes_in = ByteCounter::new();
    let bytes_out = ByteCounter::new();
    let (mut msg_reader, read_pump) = spawn_reader(
        CountingReader::new(reader, bytes_in.clone()),
        config.channel_capacity,
        config.ack_timeout(),
    );
    let (mut ack_writer, write_pump) = spawn_writer(
        CountingWriter::new(writer, bytes_out.clone()),
        config.channel_capacity,
    );

    let mut summary = SyncSummary::default();
    let logic = receive_tree(
        own,
        &mut msg_reader,
        &mut ack_writer,
        registry,
        config.debug_framing,
        metrics,
        &mut summary,
    );

    drop(ack_writer);
    drop(msg_reader);

    let mut failures: Vec<String> = Vec::new();
    if let Err(e) = &logic {
        failures.push(format!("learner: {e}"));
    }
    for (name, handle) in [("read pump", read_pump), ("write pump", write_pump)] {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failures.push(format!("{name}: {e}")),
            Err(_) => failures.push(format!("{name}: panicked")),
        }
    }

    summary.bytes_sent = bytes_out.count();
    summary.bytes_received = bytes_in.count();
    if let Some(m) = metrics {
        m.sync_bytes_sent_total.inc_by(summary.bytes_sent);
        m.sync_bytes_received_total.inc_by(summary.bytes_received);
    }

    match (logic, failures.len()) {
        (Ok(tree), 0) => {
            info!(
                nodes = summary.node_messages,
                bytes_sent = summary.bytes_sent,
                bytes_received = summary.bytes_received,
                "learning finished"
            );
            Ok((tree, summary))
        }
        (Err(e), 1) => {
            warn!(err = %e, "learning failed");
            Err(e)
        }
        (_, _) => {
            warn!(?failures, "learning failed");
            Err(SyncError::Workers(failures))
        }
    }
}

fn receive_tree(
    own: &MerkleTree,
    msg_reader: &mut dyn Read,
    ack_writer: &mut dyn Write,
    registry: &ConstructableRegistry,
    debug_framing: bool,
    metrics: Option<&Metrics>,
    summary: &mut SyncSummary,
) -> SyncResult<MerkleTree> {
    let offered_root = read_digest(msg_reader)?;
    if offered_root.is_zero() {
        debug!("teacher offered an empty tree");
        return Ok(MerkleTree::new());
    }

    // Digest index over the learner's own tree; only hashed nodes can match.
    let mut index: HashMap<Digest, NodeId> = HashMap::new();
    for id in own.iter(TraversalOrder::PreOrder) {
        if let Some(hash) = own.node(id)?.hash() {
            index.entry(hash).or_insert(id);
        }
    }

    let mut tree = MerkleTree::new();
    let mut expected: VecDeque<Expected> = VecDeque::new();

    let have_root = index.contains_key(&offered_root);
    answer_offer(ack_writer, have_root, metrics, summary)?;
    ack_writer.flush().map_err(StreamError::from)?;
    expected.push_back(Expected {
        parent: None,
        digest: offered_root,
        already_have: have_root,
    });

    while let Some(exp) = expected.pop_front() {
        let message = read_node_message(msg_reader, registry, debug_framing)?;
        summary.node_messages += 1;
        if let Some(m) = metrics {
            m.sync_nodes_received_total.inc();
        }

        let node = match (exp.already_have, message) {
            (true, NodeDataMessage::Empty) => {
                let local = *index.get(&exp.digest).ok_or_else(|| {
                    SyncError::Protocol("acknowledged digest no longer present".to_string())
                })?;
                copy_subtree(own, local, &mut tree)?
            }
            (false, NodeDataMessage::Leaf { value }) => {
                let self_hashing = value.is_self_hashing();
                let id = tree.create_leaf(value);
                if self_hashing {
                    // Carried externally; never recomputed.
                    tree.set_hash(id, exp.digest)?;
                }
                id
            }
            (false, NodeDataMessage::Internal {
                class_id,
                version,
                child_digests,
            }) => {
                let id = tree.create_internal(class_id, version, child_digests.len());
                attach(&mut tree, &exp, id)?;
                for (slot, digest) in child_digests.iter().enumerate() {
                    if digest.is_zero() {
                        continue;
                    }
                    let have = index.contains_key(digest);
                    answer_offer(ack_writer, have, metrics, summary)?;
                    expected.push_back(Expected {
                        parent: Some((id, slot)),
                        digest: *digest,
                        already_have: have,
                    });
                }
                ack_writer.flush().map_err(StreamError::from)?;
                continue;
            }
            (true, other) => {
                return Err(SyncError::Protocol(format!(
                    "expected empty message for an acknowledged subtree, got {other:?}"
                )));
            }
            (false, NodeDataMessage::Empty) => {
                return Err(SyncError::Protocol(
                    "empty message for a subtree this side asked for".to_string(),
                ));
            }
        };
        attach(&mut tree, &exp, node)?;
    }

    // Everything arrived; the reconstructed tree must hash to the offer.
    let computed = hash_tree(&mut tree)?
        .ok_or_else(|| SyncError::Protocol("reconstructed tree is empty".to_string()))?;
    if computed != offered_root {
        return Err(SyncError::RootDigestMismatch {
            offered: offered_root,
            computed,
        });
    }
    Ok(tree)
}

fn answer_offer(
    ack_writer: &mut dyn Write,
    have: bool,
    metrics: Option<&Metrics>,
    summary: &mut SyncSummary,
) -> SyncResult<()> {
    write_ack(ack_writer, have)?;
    if have {
        summary.acks_affirmative += 1;
    } else {
        summary.acks_negative += 1;
    }
    if let Some(m) = metrics {
        if have {
            m.sync_acks_affirmative_total.inc();
        } else {
            m.sync_acks_negative_total.inc();
        }
    }
    Ok(())
}

fn attach(tree: &mut MerkleTree, exp: &Expected, id: NodeId) -> SyncResult<()> {
    match exp.parent {
        None => tree.set_root(Some(id))?,
        Some((parent, slot)) => tree.set_child(parent, slot, Some(id))?,
    }
    Ok(())
}

/// Deep-copy a subtree between trees, structure first, digests afterwards.
fn copy_subtree(src: &MerkleTree, src_root: NodeId, dst: &mut MerkleTree) -> MerkleResult<NodeId> {
    let mut result = None;
    let mut digests: Vec<(NodeId, Digest)> = Vec::new();
    let mut stack: Vec<(NodeId, Option<(NodeId, usize)>)> = vec![(src_root, None)];
    while let Some((sid, parent)) = stack.pop() {
        let snode = src.node(sid)?;
        let did = match snode.value() {
            Some(value) => dst.create_leaf(value.clone_box()),
            None => dst.create_internal(snode.class_id(), snode.version(), snode.children().len()),
        };
        if let Some(hash) = snode.hash() {
            digests.push((did, hash));
        }
        match parent {
            None => result = Some(did),
            Some((pid, slot)) => dst.set_child(pid, slot, Some(did))?,
        }
        for (slot, child) in snode.children().iter().enumerate() {
            if let Some(child) = child {
                stack.push((*child, Some((did, slot))));
            }
        }
    }
    let root =
        result.ok_or_else(|| crate::core::merkle::MerkleError::InvalidNode(src_root))?;
    for (id, digest) in digests {
        dst.set_hash(id, digest)?;
    }
    Ok(root)
}
