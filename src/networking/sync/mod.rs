#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Merkle tree synchronization between a teacher holding a tree and a
//! learner reconstructing it over a lossy link.
//!
//! Both roles run over any `Read`/`Write` pair. Each side wraps its halves
//! in asynchronous pumps (dedicated worker threads); the protocol is
//! pipelined: the teacher keeps many digest offers in flight and the learner
//! answers them in order with one-byte acks.

pub mod learner;
pub mod messages;
pub mod pump;
pub mod teacher;

pub use learner::learn;
pub use messages::NodeDataMessage;
pub use teacher::{teach, AckStatus, NodeToSend};

use crate::core::codec::StreamError;
use crate::core::merkle::MerkleError;
use crate::core::ser::SerError;
use crate::core::types::Digest;
use thiserror::Error;

/// Synchronization failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Merkle model failure underneath.
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    /// Serialization failure underneath.
    #[error(transparent)]
    Ser(#[from] SerError),
    /// Framing or I/O failure underneath.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// No ack arrived within the configured window.
    #[error("timed out while waiting for ack")]
    AckTimeout,
    /// The far side violated the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The tree to teach (or compare against) has no computed root digest.
    #[error("tree is not hashed")]
    TreeNotHashed,
    /// The reconstructed tree does not match the teacher's root digest.
    #[error("root digest mismatch: offered {offered}, computed {computed}")]
    RootDigestMismatch {
        /// Digest the teacher offered for its root.
        offered: Digest,
        /// Digest computed over the reconstructed tree.
        computed: Digest,
    },
    /// One or more workers failed; all failures are retained.
    #[error("synchronization workers failed: {0:?}")]
    Workers(Vec<String>),
}

/// Result alias for synchronizer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Byte and message counts observed by one side of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Bytes written to the link.
    pub bytes_sent: u64,
    /// Bytes read from the link.
    pub bytes_received: u64,
    /// Node-data messages sent (teacher) or received (learner).
    pub node_messages: u64,
    /// Affirmative acks observed.
    pub acks_affirmative: u64,
    /// Negative acks observed.
    pub acks_negative: u64,
}
