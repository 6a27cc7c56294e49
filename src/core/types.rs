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

//! Shared value types: digests and signer identities.

use std::fmt;
use thiserror::Error;

/// Length in bytes of every merkle digest (SHA-384).
pub const DIGEST_LENGTH: usize = 48;

/// Digest parse error.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("bad hex")]
    Hex,
    #[error("bad length {0}, expected {DIGEST_LENGTH}")]
    Length(usize),
}

/// 384-bit digest (48 bytes). The zero digest is reserved for "absent".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// The all-zeroes digest, used as the placeholder for null children.
    pub const ZERO: Digest = Digest([0u8; DIGEST_LENGTH]);

    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; DIGEST_LENGTH]) -> Self {
        Self(b)
    }

    /// Construct from a slice; errors on wrong length.
    pub fn from_slice(b: &[u8]) -> Result<Self, DigestError> {
        if b.len() != DIGEST_LENGTH {
            return Err(DigestError::Length(b.len()));
        }
        let mut out = [0u8; DIGEST_LENGTH];
        out.copy_from_slice(b);
        Ok(Self(out))
    }

    /// Parse from lowercase hex.
    pub fn from_hex(s: &str) -> Result<Self, DigestError> {
        let raw = hex::decode(s).map_err(|_| DigestError::Hex)?;
        Self::from_slice(&raw)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    /// True for the reserved all-zeroes digest.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Full lowercase hex string (96 chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Leading 8 bytes are enough for log readability.
        write!(f, "{}..", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

/// Signer identity (Ed25519 public key bytes, expected 32).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignerId(pub Vec<u8>);

impl SignerId {
    /// Interpret as Ed25519 public key bytes if length is 32.
    pub fn as_public_key_bytes(&self) -> Option<[u8; 32]> {
        if self.0.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0);
        Some(out)
    }
}

impl fmt::Display for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}
