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

//! The [`SelfSerializable`] trait and the polymorphic record codec.
//!
//! Record layout with the class id included:
//!
//! ```text
//! [class_id : i64]     NULL_CLASS_ID => value is null, stop
//! [version  : i32]
//! [payload  : object-defined]
//! [trailer  : i64]     present iff debug framing; equals -class_id
//! ```
//!
//! With the class id fixed by context the id field is omitted and a
//! `NULL_VERSION` version field marks null instead.

use super::class_id::{ClassId, NULL_CLASS_ID, NULL_VERSION};
use super::registry::ConstructableRegistry;
use super::{SerError, SerResult};
use crate::core::codec::streams::{read_marker_i64, write_marker_i64};
use crate::core::codec::{StreamError, NULL_LIST_ARRAY_LENGTH};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

/// A polymorphic value that encodes its full state behind a class id and a
/// version.
pub trait SelfSerializable: fmt::Debug + Send + Sync {
    /// Stable class id.
    fn class_id(&self) -> ClassId;

    /// Current version, written ahead of the payload.
    fn version(&self) -> i32;

    /// Oldest version this code can still deserialize.
    fn minimum_supported_version(&self) -> i32 {
        1
    }

    /// Write the payload (class id and version are framed by the caller).
    fn serialize(&self, w: &mut dyn Write) -> SerResult<()>;

    /// Read the payload previously written at `version`.
    fn deserialize(&mut self, r: &mut dyn Read, version: i32) -> SerResult<()>;

    /// Clone into a boxed trait object.
    fn clone_box(&self) -> Box<dyn SelfSerializable>;

    /// True if the value's merkle hash is carried externally and must never
    /// be recomputed or overwritten.
    fn is_self_hashing(&self) -> bool {
        false
    }

    /// True if the payload body lives outside the stream, addressed by its
    /// content hash (a sibling file in the state directory).
    fn is_external(&self) -> bool {
        false
    }
}

impl Clone for Box<dyn SelfSerializable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Serialize a value's payload into a fresh buffer.
pub fn serialize_to_vec(value: &dyn SelfSerializable) -> SerResult<Vec<u8>> {
    let mut buf = Vec::new();
    value.serialize(&mut buf)?;
    Ok(buf)
}

/// Equality over the canonical encoding. Sound because the encoding is
/// deterministic.
pub fn serializable_eq(
    a: &dyn SelfSerializable,
    b: &dyn SelfSerializable,
) -> SerResult<bool> {
    if a.class_id() != b.class_id() || a.version() != b.version() {
        return Ok(false);
    }
    Ok(serialize_to_vec(a)? == serialize_to_vec(b)?)
}

fn check_version(
    class_id: ClassId,
    version: i32,
    min: i32,
    max: i32,
) -> SerResult<()> {
    if version < min || version > max {
        return Err(SerError::IllegalVersion {
            class_id,
            version,
            min,
            max,
        });
    }
    Ok(())
}

/// Write a full record: class id, version, payload, optional debug trailer.
pub fn write_serializable(
    w: &mut dyn Write,
    value: Option<&dyn SelfSerializable>,
    debug_framing: bool,
) -> SerResult<()> {
    let Some(v) = value else {
        w.write_i64::<BigEndian>(NULL_CLASS_ID.0)
            .map_err(StreamError::from)?;
        return Ok(());
    };
    let class_id = v.class_id();
    w.write_i64::<BigEndian>(class_id.0)
        .map_err(StreamError::from)?;
    w.write_i32::<BigEndian>(v.version())
        .map_err(StreamError::from)?;
    v.serialize(w)?;
    if debug_framing {
        write_marker_i64(w, -class_id.0).map_err(SerError::from)?;
    }
    Ok(())
}

/// Write a record whose class is fixed by context: version, payload,
/// optional debug trailer. Null is marked by a `NULL_VERSION` version field.
pub fn write_serializable_known(
    w: &mut dyn Write,
    value: Option<&dyn SelfSerializable>,
    debug_framing: bool,
) -> SerResult<()> {
    let Some(v) = value else {
        w.write_i32::<BigEndian>(NULL_VERSION)
            .map_err(StreamError::from)?;
        return Ok(());
    };
    w.write_i32::<BigEndian>(v.version())
        .map_err(StreamError::from)?;
    v.serialize(w)?;
    if debug_framing {
        write_marker_i64(w, -v.class_id().0).map_err(SerError::from)?;
    }
    Ok(())
}

fn read_payload_into(
    r: &mut dyn Read,
    registry: &ConstructableRegistry,
    class_id: ClassId,
    version: i32,
    debug_framing: bool,
) -> SerResult<Box<dyn SelfSerializable>> {
    let mut instance = registry.construct(class_id)?;
    check_version(
        class_id,
        version,
        instance.minimum_supported_version(),
        instance.version(),
    )?;
    instance.deserialize(r, version)?;
    if debug_framing {
        read_marker_i64(r, "serializable trailer", -class_id.0).map_err(SerError::from)?;
    }
    Ok(instance)
}

/// Read a full record written by [`write_serializable`].
pub fn read_serializable(
    r: &mut dyn Read,
    registry: &ConstructableRegistry,
    debug_framing: bool,
) -> SerResult<Option<Box<dyn SelfSerializable>>> {
    let raw = r.read_i64::<BigEndian>().map_err(StreamError::from)?;
    if raw == NULL_CLASS_ID.0 {
        return Ok(None);
    }
    let class_id = ClassId(raw);
    let version = r.read_i32::<BigEndian>().map_err(StreamError::from)?;
    Ok(Some(read_payload_into(
        r,
        registry,
        class_id,
        version,
        debug_framing,
    )?))
}

/// Read a record whose class is fixed by context, written by
/// [`write_serializable_known`].
pub fn read_serializable_known(
    r: &mut dyn Read,
    registry: &ConstructableRegistry,
    class_id: ClassId,
    debug_framing: bool,
) -> SerResult<Option<Box<dyn SelfSerializable>>> {
    let version = r.read_i32::<BigEndian>().map_err(StreamError::from)?;
    if version == NULL_VERSION {
        return Ok(None);
    }
    Ok(Some(read_payload_into(
        r,
        registry,
        class_id,
        version,
        debug_framing,
    )?))
}

/// Entry type for serializable lists.
pub type SerializableList = Vec<Option<Box<dyn SelfSerializable>>>;

fn shared_class(list: &[Option<Box<dyn SelfSerializable>>]) -> Option<(ClassId, i32)> {
    let mut shared = None;
    for entry in list.iter().flatten() {
        let key = (entry.class_id(), entry.version());
        match shared {
            None => shared = Some(key),
            Some(existing) if existing == key => {}
            Some(_) => return None,
        }
    }
    // A list with no non-null entries gets the plain representation.
    shared
}

/// Write a list of serializables.
///
/// Layout: i32 length (`-1` null), an "all entries share a class" bool, then
/// either full records, or null-marker bools with one shared class-id and
/// version header at the first non-null entry and bare payloads afterwards.
pub fn write_serializable_list(
    w: &mut dyn Write,
    list: Option<&[Option<Box<dyn SelfSerializable>>]>,
    debug_framing: bool,
) -> SerResult<()> {
    let Some(items) = list else {
        w.write_i32::<BigEndian>(NULL_LIST_ARRAY_LENGTH)
            .map_err(StreamError::from)?;
        return Ok(());
    };
    w.write_i32::<BigEndian>(items.len() as i32)
        .map_err(StreamError::from)?;
    let shared = shared_class(items);
    w.write_u8(u8::from(shared.is_some()))
        .map_err(StreamError::from)?;
    if shared.is_none() {
        for entry in items {
            write_serializable(w, entry.as_deref(), debug_framing)?;
        }
        return Ok(());
    }
    let mut header_written = false;
    for entry in items {
        match entry {
            None => {
                w.write_u8(1).map_err(StreamError::from)?;
            }
            Some(v) => {
                w.write_u8(0).map_err(StreamError::from)?;
                if !header_written {
                    // The one shared header; followers carry payload only.
                    write_serializable(w, Some(v.as_ref()), debug_framing)?;
                    header_written = true;
                } else {
                    v.serialize(w)?;
                }
            }
        }
    }
    Ok(())
}

/// Read a list written by [`write_serializable_list`], bounded by `max_len`.
pub fn read_serializable_list(
    r: &mut dyn Read,
    registry: &ConstructableRegistry,
    max_len: usize,
    debug_framing: bool,
) -> SerResult<Option<SerializableList>> {
    let len = r.read_i32::<BigEndian>().map_err(StreamError::from)?;
    if len == NULL_LIST_ARRAY_LENGTH {
        return Ok(None);
    }
    if len < 0 {
        return Err(SerError::Stream(StreamError::BadLength(len)));
    }
    if len as usize > max_len {
        return Err(SerError::Stream(StreamError::LengthLimitExceeded {
            length: len as i64,
            limit: max_len,
        }));
    }
    let len = len as usize;
    let all_same = r.read_u8().map_err(StreamError::from)? != 0;
    let mut out: SerializableList = Vec::with_capacity(len.min(1024));
    if !all_same {
        for _ in 0..len {
            out.push(read_serializable(r, registry, debug_framing)?);
        }
        return Ok(Some(out));
    }
    let mut shared: Option<(ClassId, i32)> = None;
    for _ in 0..len {
        let is_null = r.read_u8().map_err(StreamError::from)? != 0;
        if is_null {
            out.push(None);
            continue;
        }
        match shared {
            None => {
                let first = read_serializable(r, registry, debug_framing)?;
                let Some(first) = first else {
                    // Shared-mode entries flag null explicitly; a null class
                    // id here means the stream is inconsistent.
                    return Err(SerError::ClassNotFound(NULL_CLASS_ID));
                };
                shared = Some((first.class_id(), first.version()));
                out.push(Some(first));
            }
            Some((class_id, version)) => {
                let mut instance = registry.construct(class_id)?;
                instance.deserialize(r, version)?;
                out.push(Some(instance));
            }
        }
    }
    Ok(Some(out))
}
