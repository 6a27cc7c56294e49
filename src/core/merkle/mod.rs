#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Merkle tree model: route-addressed, reference-counted nodes with lazy
//! hashing, traversal iterators and whole-tree serialization.

pub mod hashing;
pub mod io;
pub mod iterators;
pub mod route;
pub mod state;
pub mod tree;

pub use route::MerkleRoute;
pub use tree::{MerkleTree, NodeData, NodeId, NodeKind};

use crate::core::codec::StreamError;
use crate::core::ser::{ClassId, SerError};
use crate::core::types::Digest;
use thiserror::Error;

/// Merkle model failures.
#[derive(Debug, Error)]
pub enum MerkleError {
    /// Serialization failure underneath.
    #[error(transparent)]
    Ser(#[from] SerError),
    /// Framing failure underneath.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// An internal node declared a child count outside its class bounds.
    #[error("illegal child count {count} for class {class_id} v{version}: allowed [{min}, {max}]")]
    IllegalChildCount {
        /// Class of the offending node.
        class_id: ClassId,
        /// Version carried by the stream.
        version: i32,
        /// Count read from the stream.
        count: i64,
        /// Minimum children allowed.
        min: usize,
        /// Maximum children allowed.
        max: usize,
    },
    /// Node id does not resolve to a live node.
    #[error("node {0} is not part of this tree")]
    InvalidNode(NodeId),
    /// Mutation attempted on a released node.
    #[error("node {0} is released")]
    NodeReleased(NodeId),
    /// Mutation attempted on an immutable node.
    #[error("node {0} is immutable")]
    NodeImmutable(NodeId),
    /// Child index outside an internal node's slot list.
    #[error("child index {index} out of bounds for node {node} with {count} slots")]
    ChildIndexOutOfBounds {
        /// Parent node.
        node: NodeId,
        /// Requested index.
        index: usize,
        /// Number of slots.
        count: usize,
    },
    /// A leaf operation hit an internal node or vice versa.
    #[error("node {0} has the wrong kind for this operation")]
    WrongNodeKind(NodeId),
    /// Tree stream carried more nodes than the caller allows.
    #[error("tree exceeds {max} nodes")]
    MaxNodesExceeded {
        /// Caller-supplied cap.
        max: usize,
    },
    /// A self-hashing leaf was found without its externally supplied hash.
    #[error("self-hashing leaf {0} has no hash")]
    SelfHashingWithoutHash(NodeId),
    /// Strategy or option mismatch during whole-tree serialization.
    #[error("merkle serialization: {0}")]
    Serialization(String),
    /// External leaf payload missing from the state directory.
    #[error("external payload {0} not found")]
    ExternalPayloadMissing(Digest),
}

/// Result alias for merkle operations.
pub type MerkleResult<T> = Result<T, MerkleError>;
