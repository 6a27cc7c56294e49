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

//! Teaching side of the merkle synchronizer.
//!
//! Every digest offer (the root digest, then each child digest inside a full
//! node message) creates one [`NodeToSend`] entry in both `nodes_to_send`
//! and `nodes_awaiting_response`. The learner answers offers in order; the
//! receiver worker consumes acks positionally, records each answer on its
//! entry and wakes the sender. The sender acts on an entry only once its
//! recorded status is known: a subtree the learner already holds travels as
//! a single empty message and is never descended into.

use super::messages::{write_empty_message, write_internal_message, write_leaf_message};
use super::pump::{spawn_reader, spawn_writer, ChannelReader};
use super::{SyncError, SyncResult, SyncSummary};
use crate::core::codec::extensions::{ByteCounter, CountingReader, CountingWriter};
use crate::core::codec::StreamError;
use crate::core::config::SyncConfig;
use crate::core::merkle::io::write_digest;
use crate::core::merkle::{MerkleTree, NodeId};
use crate::core::types::Digest;
use crate::monitoring::metrics::Metrics;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const STATUS_UNKNOWN: u8 = 0;
const STATUS_HAS: u8 = 1;
const STATUS_NEEDS: u8 = 2;

/// The learner's answer to an offer, as recorded on its entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckStatus {
    /// No answer yet.
    Unknown,
    /// Learner already holds the subtree.
    LearnerHasIt,
    /// Learner needs the subtree.
    LearnerNeedsIt,
}

/// One outstanding offer.
pub struct NodeToSend {
    node: NodeId,
    status: AtomicU8,
}

impl NodeToSend {
    fn new(node: NodeId) -> Arc<Self> {
        Arc::new(Self {
            node,
            status: AtomicU8::new(STATUS_UNKNOWN),
        })
    }

    fn record(&self, affirmative: bool) {
        self.status.store(
            if affirmative { STATUS_HAS } else { STATUS_NEEDS },
            Ordering::Release,
        );
    }

    /// Answer recorded by the receiver worker.
    pub fn ack_status(&self) -> AckStatus {
        match self.status.load(Ordering::Acquire) {
            STATUS_HAS => AckStatus::LearnerHasIt,
            STATUS_NEEDS => AckStatus::LearnerNeedsIt,
            _ => AckStatus::Unknown,
        }
    }
}

/// Teach the tree to the far side of the stream pair.
///
/// The tree must be fully hashed. Returns the byte and message counts of the
/// run once every worker has finished.
pub fn teach<R, W>(
    tree: &MerkleTree,
    reader: R,
    writer: W,
    config: &SyncConfig,
    metrics: Option<&Metrics>,
) -> SyncResult<SyncSummary>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let bytes_in = ByteCounter::new();
    let bytes_out = ByteCounter::new();
    let (ack_reader, read_pump) = spawn_reader(
        CountingReader::new(reader, bytes_in.clone()),
        config.channel_capacity,
        config.ack_timeout(),
    );
    let (mut msg_writer, write_pump) = spawn_writer(
        CountingWriter::new(writer, bytes_out.clone()),
        config.channel_capacity,
    );

    let (awaiting_tx, awaiting_rx) = unbounded::<Arc<NodeToSend>>();
    let (answered_tx, answered_rx) = unbounded::<()>();

    let receiver_metrics = metrics.cloned();
    let ack_timeout = config.ack_timeout();
    let poll_interval = config.poll_interval();
    let receiver = std::thread::spawn(move || {
        receive_acks(
            ack_reader,
            awaiting_rx,
            answered_tx,
            poll_interval,
            receiver_metrics,
        )
    });

    let mut summary = SyncSummary::default();
    let logic = send_tree(
        tree,
        &mut msg_writer,
        awaiting_tx,
        answered_rx,
        ack_timeout,
        config.debug_framing,
        metrics,
        &mut summary,
    );

    // Closing the outbound handle lets the write pump drain and exit; the
    // read pump exits when the far side closes its half.
    drop(msg_writer);

    let mut failures: Vec<String> = Vec::new();
    if let Err(e) = &logic {
        failures.push(format!("sender: {e}"));
    }
    match receiver.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => failures.push(format!("receiver: {e}")),
        Err(_) => failures.push("receiver: panicked".to_string()),
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
        (Ok(()), 0) => {
            info!(
                nodes = summary.node_messages,
                bytes_sent = summary.bytes_sent,
                bytes_received = summary.bytes_received,
                "teaching finished"
            );
            Ok(summary)
        }
        (Err(e), 1) => {
            warn!(err = %e, "teaching failed");
            Err(e)
        }
        (_, _) => {
            warn!(?failures, "teaching failed");
            Err(SyncError::Workers(failures))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn send_tree(
    tree: &MerkleTree,
    msg_writer: &mut dyn Write,
    awaiting_tx: Sender<Arc<NodeToSend>>,
    answered_rx: Receiver<()>,
    ack_timeout: Duration,
    debug_framing: bool,
    metrics: Option<&Metrics>,
    summary: &mut SyncSummary,
) -> SyncResult<()> {
    let root = tree.root();
    let root_digest = match root {
        Some(id) => tree
            .node(id)?
            .hash()
            .ok_or(SyncError::TreeNotHashed)?,
        None => Digest::ZERO,
    };
    write_digest(msg_writer, &root_digest)?;
    msg_writer.flush().map_err(StreamError::from)?;
    debug!(root = %root_digest, "offered root digest");

    let mut nodes_to_send: VecDeque<Arc<NodeToSend>> = VecDeque::new();
    if let Some(root_id) = root {
        let entry = NodeToSend::new(root_id);
        awaiting_tx
            .send(entry.clone())
            .map_err(|_| SyncError::Protocol("ack receiver terminated".to_string()))?;
        nodes_to_send.push_back(entry);
    }

    while let Some(entry) = nodes_to_send.pop_front() {
        // Entries are answered in offer order; one wakeup per entry.
        answered_rx
            .recv_timeout(ack_timeout)
            .map_err(|_| SyncError::AckTimeout)?;
        summary.node_messages += 1;
        if let Some(m) = metrics {
            m.sync_nodes_sent_total.inc();
        }
        match entry.ack_status() {
            AckStatus::LearnerHasIt => {
                summary.acks_affirmative += 1;
                write_empty_message(msg_writer)?;
                msg_writer.flush().map_err(StreamError::from)?;
                continue;
            }
            AckStatus::LearnerNeedsIt => {
                summary.acks_negative += 1;
            }
            AckStatus::Unknown => {
                return Err(SyncError::Protocol(
                    "wakeup without a recorded ack".to_string(),
                ));
            }
        }

        let node = tree.node(entry.node)?;
        if let Some(value) = node.value() {
            write_leaf_message(msg_writer, value, debug_framing)?;
        } else {
            let mut child_digests = Vec::with_capacity(node.children().len());
            for child in node.children() {
                match child {
                    Some(child) => child_digests.push(
                        tree.node(*child)?
                            .hash()
                            .ok_or(SyncError::TreeNotHashed)?,
                    ),
                    None => child_digests.push(Digest::ZERO),
                }
            }
            write_internal_message(
                msg_writer,
                node.class_id(),
                node.version(),
                &child_digests,
                debug_framing,
            )?;
            // Each non-null child digest is a fresh offer.
            for child in node.children().iter().flatten() {
                let child_entry = NodeToSend::new(*child);
                awaiting_tx
                    .send(child_entry.clone())
                    .map_err(|_| SyncError::Protocol("ack receiver terminated".to_string()))?;
                nodes_to_send.push_back(child_entry);
            }
        }
        msg_writer.flush().map_err(StreamError::from)?;
    }
    Ok(())
}

fn receive_acks(
    mut reader: ChannelReader,
    awaiting_rx: Receiver<Arc<NodeToSend>>,
    answered_tx: Sender<()>,
    poll_interval: Duration,
    metrics: Option<Metrics>,
) -> SyncResult<()> {
    loop {
        // An empty queue means no outstanding work; keep polling until the
        // sender hangs up.
        let entry = match awaiting_rx.recv_timeout(poll_interval) {
            Ok(entry) => entry,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };
        let affirmative = match super::messages::read_ack(&mut reader) {
            Ok(a) => a,
            Err(SyncError::Stream(StreamError::Io(e))) if e.kind() == ErrorKind::TimedOut => {
                return Err(SyncError::AckTimeout);
            }
            Err(e) => return Err(e),
        };
        entry.record(affirmative);
        if let Some(m) = &metrics {
            if affirmative {
                m.sync_acks_affirmative_total.inc();
            } else {
                m.sync_acks_negative_total.inc();
            }
        }
        if answered_tx.send(()).is_err() {
            // Sender finished early (failed); nothing more to record.
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_start_unknown_and_record_both_answers() {
        let yes = NodeToSend::new(NodeId(0));
        assert_eq!(yes.ack_status(), AckStatus::Unknown);
        yes.record(true);
        assert_eq!(yes.ack_status(), AckStatus::LearnerHasIt);

        let no = NodeToSend::new(NodeId(1));
        no.record(false);
        assert_eq!(no.ack_status(), AckStatus::LearnerNeedsIt);
    }
}
