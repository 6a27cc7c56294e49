#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Length-prefixed, typed stream framing with null and bounds handling.
//!
//! All multi-byte integers are big-endian. Length prefixes are validated
//! against caller-supplied limits before any allocation happens.

pub mod extensions;
pub mod streams;

use thiserror::Error;

/// Length prefix denoting a null collection or byte array.
pub const NULL_LIST_ARRAY_LENGTH: i32 = -1;

/// Epoch-second sentinel denoting a null instant.
pub const NULL_INSTANT_EPOCH_SECOND: i64 = i64::MIN;

/// Framing violations and I/O failures.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Underlying I/O failure or truncated frame.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// An expected marker did not match.
    #[error("invalid stream position: marker {name} expected {expected}, read {actual}")]
    InvalidStreamPosition {
        /// Marker name, for diagnostics.
        name: &'static str,
        /// Value the stream was expected to carry.
        expected: i64,
        /// Value actually read.
        actual: i64,
    },
    /// A length prefix exceeded the caller's limit.
    #[error("length {length} exceeds limit {limit}")]
    LengthLimitExceeded {
        /// Length read from the stream.
        length: i64,
        /// Caller-supplied limit.
        limit: usize,
    },
    /// A length prefix was negative but not the null sentinel.
    #[error("bad length prefix {0}")]
    BadLength(i32),
    /// Byte-array checksum did not match `101 - length`.
    #[error("checksum mismatch: expected {expected}, read {actual}")]
    ChecksumMismatch {
        /// Checksum implied by the length prefix.
        expected: i32,
        /// Checksum read from the stream.
        actual: i32,
    },
    /// Instant nanosecond field outside `[0, 999_999_999]`.
    #[error("nanos {0} out of range")]
    NanosOutOfRange(i64),
    /// A string payload was not valid UTF-8.
    #[error("invalid utf-8")]
    InvalidUtf8,
}

/// Result alias for framing operations.
pub type StreamResult<T> = Result<T, StreamError>;
