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

//! Reconnect handshake: a fallen-behind learner asks a teacher for a signed
//! state.
//!
//! The learner writes a single request byte and reads one byte back: ACK
//! means the teacher proceeds to stream its hashed tree followed by a
//! signature set over the root digest; NACK means the teacher refused (the
//! learner may try another peer); anything else is a protocol violation.

use crate::core::codec::streams::{read_byte_array, write_byte_array};
use crate::core::codec::StreamError;
use crate::core::merkle::io::{
    deserialize_tree, serialize_tree, SerializableOptions,
};
use crate::core::merkle::{MerkleError, MerkleTree};
use crate::core::ser::ConstructableRegistry;
use crate::core::types::{Digest, SignerId};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ring::signature::{UnparsedPublicKey, ED25519};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// Learner's opening byte.
pub const COMM_STATE_REQUEST: u8 = 0x52;
/// Teacher accepts; the state follows.
pub const COMM_STATE_ACK: u8 = 0x41;
/// Teacher refuses; the learner may try another peer.
pub const COMM_STATE_NACK: u8 = 0x4e;

const MAX_SIGNERS: usize = 4096;
const MAX_SIGNER_LEN: usize = 64;
const MAX_SIGNATURE_LEN: usize = 128;

/// Reconnect failures.
#[derive(Debug, Error)]
pub enum ReconnectError {
    /// Framing violation or I/O failure.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// Tree stream failure.
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    /// Teacher replied NACK. Non-fatal: try another peer.
    #[error("teacher refused the reconnect")]
    Refused,
    /// Unexpected handshake byte.
    #[error("bad handshake byte {0:#x}")]
    BadHandshakeByte(u8),
    /// A signature in the set does not verify against the root digest.
    #[error("invalid signature from {0}")]
    SignatureInvalid(SignerId),
    /// Everything else the far side did wrong.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Bounds how many learners a teacher serves at once.
#[derive(Debug)]
pub struct ReconnectPolicy {
    max_concurrent: usize,
    active: AtomicUsize,
}

/// Permit for one teaching session; releases its slot on drop.
pub struct ReconnectPermit<'a> {
    policy: &'a ReconnectPolicy,
}

impl ReconnectPolicy {
    /// Allow up to `max_concurrent` simultaneous learners.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            active: AtomicUsize::new(0),
        }
    }

    /// Try to claim a teaching slot.
    pub fn try_begin(&self) -> Option<ReconnectPermit<'_>> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.max_concurrent {
                return None;
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(ReconnectPermit { policy: self }),
                Err(actual) => current = actual,
            }
        }
    }

    /// Learners currently being served.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for ReconnectPermit<'_> {
    fn drop(&mut self) {
        self.policy.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Ed25519 signatures over a root digest, keyed by signer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureSet {
    entries: Vec<(SignerId, Vec<u8>)>,
}

impl SignatureSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a signer's signature.
    pub fn add(&mut self, signer: SignerId, signature: Vec<u8>) {
        self.entries.push((signer, signature));
    }

    /// Number of signatures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no signature is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frame the set onto a stream.
    pub fn write(&self, w: &mut dyn Write) -> Result<(), ReconnectError> {
        w.write_i32::<BigEndian>(self.entries.len() as i32)
            .map_err(StreamError::from)?;
        for (signer, signature) in &self.entries {
            write_byte_array(w, Some(&signer.0), false)?;
            write_byte_array(w, Some(signature), false)?;
        }
        Ok(())
    }

    /// Read a set framed by [`SignatureSet::write`].
    pub fn read(r: &mut dyn Read) -> Result<Self, ReconnectError> {
        let count = r.read_i32::<BigEndian>().map_err(StreamError::from)?;
        if count < 0 || count as usize > MAX_SIGNERS {
            return Err(ReconnectError::Protocol(format!(
                "bad signature count {count}"
            )));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let signer = read_byte_array(r, MAX_SIGNER_LEN, false)?
                .ok_or_else(|| ReconnectError::Protocol("null signer".to_string()))?;
            let signature = read_byte_array(r, MAX_SIGNATURE_LEN, false)?
                .ok_or_else(|| ReconnectError::Protocol("null signature".to_string()))?;
            entries.push((SignerId(signer), signature));
        }
        Ok(Self { entries })
    }

    /// Verify every signature against the root digest; returns how many
    /// verified. Signer membership is the caller's concern.
    pub fn verify(&self, root: &Digest) -> Result<usize, ReconnectError> {
        for (signer, signature) in &self.entries {
            let Some(pk) = signer.as_public_key_bytes() else {
                return Err(ReconnectError::SignatureInvalid(signer.clone()));
            };
            UnparsedPublicKey::new(&ED25519, pk)
                .verify(root.as_bytes(), signature)
                .map_err(|_| ReconnectError::SignatureInvalid(signer.clone()))?;
        }
        Ok(self.entries.len())
    }
}

/// What the teacher side did with a request.
#[derive(Debug)]
pub enum ServeOutcome {
    /// State streamed successfully.
    Taught,
    /// Refused with NACK (no free slot).
    Refused,
}

/// Teacher side: answer one reconnect request on the stream pair.
///
/// The tree must be fully hashed; it is streamed with digests attached,
/// followed by the signature set.
pub fn serve<R: Read, W: Write>(
    tree: &MerkleTree,
    signatures: &SignatureSet,
    policy: &ReconnectPolicy,
    r: &mut R,
    w: &mut W,
) -> Result<ServeOutcome, ReconnectError> {
    let request = r.read_u8().map_err(StreamError::from)?;
    if request != COMM_STATE_REQUEST {
        return Err(ReconnectError::BadHandshakeByte(request));
    }
    let Some(_permit) = policy.try_begin() else {
        w.write_u8(COMM_STATE_NACK).map_err(StreamError::from)?;
        w.flush().map_err(StreamError::from)?;
        info!("reconnect refused, no free slot");
        return Ok(ServeOutcome::Refused);
    };
    w.write_u8(COMM_STATE_ACK).map_err(StreamError::from)?;
    serialize_tree(
        w,
        tree,
        SerializableOptions {
            external: false,
            write_hashes: true,
        },
        None,
    )?;
    signatures.write(w)?;
    w.flush().map_err(StreamError::from)?;
    info!(signers = signatures.len(), "reconnect state streamed");
    Ok(ServeOutcome::Taught)
}

/// Learner side: request a signed state and verify its signatures.
pub fn request<R: Read, W: Write>(
    registry: &ConstructableRegistry,
    max_nodes: usize,
    r: &mut R,
    w: &mut W,
) -> Result<(MerkleTree, SignatureSet), ReconnectError> {
    w.write_u8(COMM_STATE_REQUEST).map_err(StreamError::from)?;
    w.flush().map_err(StreamError::from)?;
    match r.read_u8().map_err(StreamError::from)? {
        COMM_STATE_ACK => {}
        COMM_STATE_NACK => {
            warn!("teacher refused reconnect");
            return Err(ReconnectError::Refused);
        }
        other => return Err(ReconnectError::BadHandshakeByte(other)),
    }
    let (tree, options) = deserialize_tree(r, registry, max_nodes, None)?;
    if !options.write_hashes {
        return Err(ReconnectError::Protocol(
            "reconnect state must carry digests".to_string(),
        ));
    }
    let signatures = SignatureSet::read(r)?;
    // Production builds refuse an unsigned state outright.
    if signatures.is_empty() && cfg!(feature = "production") {
        return Err(ReconnectError::Protocol(
            "unsigned state refused".to_string(),
        ));
    }
    let root = match tree.root() {
        Some(id) => tree.node(id)?.hash(),
        None => None,
    };
    if let Some(root) = root {
        signatures.verify(&root)?;
    } else if !signatures.is_empty() {
        return Err(ReconnectError::Protocol(
            "signatures over an empty state".to_string(),
        ));
    }
    Ok((tree, signatures))
}
