#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Versioned, class-id-tagged serialization of polymorphic values.
//!
//! Every serializable type declares a stable 64-bit class id and a version
//! range it can still decode. The [`ConstructableRegistry`] maps class ids to
//! constructors so streams can be decoded without knowing concrete types.

pub mod basic;
pub mod class_id;
pub mod registry;
pub mod serializable;

pub use class_id::{ClassId, NULL_CLASS_ID, NULL_VERSION};
pub use registry::{ConstructableRegistry, InternalClass, Registration};
pub use serializable::{
    read_serializable, read_serializable_known, read_serializable_list, serializable_eq,
    serialize_to_vec, write_serializable, write_serializable_known, write_serializable_list,
    SelfSerializable, SerializableList,
};

use crate::core::codec::StreamError;
use thiserror::Error;

/// Serialization failures.
#[derive(Debug, Error)]
pub enum SerError {
    /// Framing violation or I/O failure underneath.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// Stream carried a version outside the supported range.
    #[error("illegal version {version} for class {class_id}: supported [{min}, {max}]")]
    IllegalVersion {
        /// Class whose version gate failed.
        class_id: ClassId,
        /// Version read from the stream.
        version: i32,
        /// Oldest version this code still decodes.
        min: i32,
        /// Current version.
        max: i32,
    },
    /// Class id missing from the registry.
    #[error("class {0} not found in registry")]
    ClassNotFound(ClassId),
    /// Attempt to register the reserved null class id.
    #[error("class id {0} is reserved")]
    ReservedClassId(ClassId),
    /// A class id was registered twice.
    #[error("class {0} already registered")]
    DuplicateClassId(ClassId),
    /// Registration attempted after the registry was sealed.
    #[error("registry is sealed")]
    RegistrySealed,
    /// Registry entry exists but has the wrong kind for this use.
    #[error("class {0} registered with a different kind")]
    WrongKind(ClassId),
}

/// Result alias for serialization operations.
pub type SerResult<T> = Result<T, SerError>;
