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

//! Synchronizer wire messages.
//!
//! A `NodeDataMessage` answers one digest offer. On the wire it is a single
//! empty/non-empty byte followed, when non-empty, by one self-serializable
//! record exactly as the generic codec frames it: class id, version, payload
//! (the leaf's own bytes, or the child count and ordered child digests for
//! an internal node, the zero digest marking an absent child) and the debug
//! trailer when that framing is on. An ack is a single byte.

use super::{SyncError, SyncResult};
use crate::core::codec::streams::{read_marker_i64, write_marker_i64};
use crate::core::codec::StreamError;
use crate::core::merkle::io::{read_digest, write_digest};
use crate::core::ser::{
    read_serializable_known, write_serializable, ClassId, ConstructableRegistry, Registration,
    SelfSerializable, NULL_CLASS_ID,
};
use crate::core::types::Digest;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Ack byte: the learner already holds a subtree with the offered digest.
pub const ACK_AFFIRMATIVE: u8 = 1;
/// Ack byte: the learner needs the subtree.
pub const ACK_NEGATIVE: u8 = 0;

const EMPTY: u8 = 1;
const NOT_EMPTY: u8 = 0;

/// One node record on the wire.
pub enum NodeDataMessage {
    /// The learner already holds this subtree; nothing follows.
    Empty,
    /// A leaf with its deserialized value.
    Leaf {
        /// The leaf's value.
        value: Box<dyn SelfSerializable>,
    },
    /// An internal node with its ordered child digests.
    Internal {
        /// Class of the node.
        class_id: ClassId,
        /// Version of the node.
        version: i32,
        /// Child digests in slot order; `Digest::ZERO` is an absent child.
        child_digests: Vec<Digest>,
    },
}

impl std::fmt::Debug for NodeDataMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeDataMessage::Empty => write!(f, "Empty"),
            NodeDataMessage::Leaf { value } => write!(f, "Leaf({:?})", value.class_id()),
            NodeDataMessage::Internal {
                class_id,
                child_digests,
                ..
            } => write!(f, "Internal({class_id:?}, {} children)", child_digests.len()),
        }
    }
}

/// Encode a full leaf record: the empty flag, then the generic record.
pub fn write_leaf_message(
    w: &mut dyn Write,
    value: &dyn SelfSerializable,
    debug_framing: bool,
) -> SyncResult<()> {
    w.write_u8(NOT_EMPTY).map_err(StreamError::from)?;
    write_serializable(w, Some(value), debug_framing)?;
    Ok(())
}

/// Encode a full internal record in the same record layout; the payload is
/// the child count and the child digests.
pub fn write_internal_message(
    w: &mut dyn Write,
    class_id: ClassId,
    version: i32,
    child_digests: &[Digest],
    debug_framing: bool,
) -> SyncResult<()> {
    w.write_u8(NOT_EMPTY).map_err(StreamError::from)?;
    w.write_i64::<BigEndian>(class_id.0)
        .map_err(StreamError::from)?;
    w.write_i32::<BigEndian>(version)
        .map_err(StreamError::from)?;
    w.write_i32::<BigEndian>(child_digests.len() as i32)
        .map_err(StreamError::from)?;
    for digest in child_digests {
        write_digest(w, digest)?;
    }
    if debug_framing {
        write_marker_i64(w, -class_id.0).map_err(SyncError::Stream)?;
    }
    Ok(())
}

/// Encode an empty record.
pub fn write_empty_message(w: &mut dyn Write) -> SyncResult<()> {
    w.write_u8(EMPTY).map_err(StreamError::from)?;
    Ok(())
}

/// Decode one node record; the registry decides leaf versus internal and
/// gates versions and child counts. Leaf records decode through the generic
/// codec once the class id names a value class.
pub fn read_node_message(
    r: &mut dyn Read,
    registry: &ConstructableRegistry,
    debug_framing: bool,
) -> SyncResult<NodeDataMessage> {
    let flag = r.read_u8().map_err(StreamError::from)?;
    match flag {
        EMPTY => Ok(NodeDataMessage::Empty),
        NOT_EMPTY => {
            let class_id = ClassId(r.read_i64::<BigEndian>().map_err(StreamError::from)?);
            if class_id == NULL_CLASS_ID {
                return Err(SyncError::Protocol(
                    "null record in a node message".to_string(),
                ));
            }
            match registry.lookup(class_id)? {
                Registration::Value(_) => {
                    let value = read_serializable_known(r, registry, class_id, debug_framing)?
                        .ok_or_else(|| {
                            SyncError::Protocol("null leaf record".to_string())
                        })?;
                    Ok(NodeDataMessage::Leaf { value })
                }
                Registration::Internal(class) => {
                    let version = r.read_i32::<BigEndian>().map_err(StreamError::from)?;
                    class.check_version(class_id, version)?;
                    let count = r.read_i32::<BigEndian>().map_err(StreamError::from)?;
                    let (min, max) = (class.child_bounds)(version);
                    if count < 0 || (count as usize) < min || (count as usize) > max {
                        return Err(SyncError::Protocol(format!(
                            "child count {count} outside [{min}, {max}] for {class_id}"
                        )));
                    }
                    let mut child_digests = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        child_digests.push(read_digest(r)?);
                    }
                    if debug_framing {
                        read_marker_i64(r, "serializable trailer", -class_id.0)
                            .map_err(SyncError::Stream)?;
                    }
                    Ok(NodeDataMessage::Internal {
                        class_id,
                        version,
                        child_digests,
                    })
                }
            }
        }
        other => Err(SyncError::Protocol(format!(
            "unknown node message flag {other}"
        ))),
    }
}

/// Write one ack byte.
pub fn write_ack(w: &mut dyn Write, affirmative: bool) -> SyncResult<()> {
    w.write_u8(if affirmative {
        ACK_AFFIRMATIVE
    } else {
        ACK_NEGATIVE
    })
    .map_err(StreamError::from)?;
    Ok(())
}

/// Read one ack byte.
pub fn read_ack(r: &mut dyn Read) -> SyncResult<bool> {
    match r.read_u8().map_err(StreamError::from)? {
        ACK_AFFIRMATIVE => Ok(true),
        ACK_NEGATIVE => Ok(false),
        other => Err(SyncError::Protocol(format!("bad ack byte {other:#x}"))),
    }
}
