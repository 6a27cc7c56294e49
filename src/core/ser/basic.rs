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

//! Built-in serializable value types.

use super::class_id::ClassId;
use super::serializable::SelfSerializable;
use super::SerResult;
use crate::core::codec::streams::{
    read_byte_array, read_instant, read_normalised_string, write_byte_array, write_instant,
    write_normalised_string, EpochInstant,
};
use crate::core::codec::StreamError;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// An opaque byte blob.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawBytes {
    bytes: Vec<u8>,
}

impl RawBytes {
    /// Stable class id.
    pub const CLASS_ID: ClassId = ClassId(0x7261_7762_7974_6573);
    /// Current version.
    pub const VERSION: i32 = 1;
    /// Hard cap on the payload length accepted from a stream.
    pub const MAX_LENGTH: usize = 1024 * 1024;

    /// Wrap the given bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Payload view.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Registry constructor.
    pub fn construct() -> Box<dyn SelfSerializable> {
        Box::<RawBytes>::default()
    }
}

impl SelfSerializable for RawBytes {
    fn class_id(&self) -> ClassId {
        Self::CLASS_ID
    }

    fn version(&self) -> i32 {
        Self::VERSION
    }

    fn serialize(&self, w: &mut dyn Write) -> SerResult<()> {
        write_byte_array(w, Some(&self.bytes), false)?;
        Ok(())
    }

    fn deserialize(&mut self, r: &mut dyn Read, _version: i32) -> SerResult<()> {
        self.bytes = read_byte_array(r, Self::MAX_LENGTH, false)?
            .ok_or(StreamError::BadLength(-1))?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn SelfSerializable> {
        Box::new(self.clone())
    }
}

/// A single signed 64-bit value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LongValue(pub i64);

impl LongValue {
    /// Stable class id.
    pub const CLASS_ID: ClassId = ClassId(0x6c6f_6e67_7661_6c75);

    /// Registry constructor.
    pub fn construct() -> Box<dyn SelfSerializable> {
        Box::<LongValue>::default()
    }
}

impl SelfSerializable for LongValue {
    fn class_id(&self) -> ClassId {
        Self::CLASS_ID
    }

    fn version(&self) -> i32 {
        1
    }

    fn serialize(&self, w: &mut dyn Write) -> SerResult<()> {
        w.write_i64::<BigEndian>(self.0).map_err(StreamError::from)?;
        Ok(())
    }

    fn deserialize(&mut self, r: &mut dyn Read, _version: i32) -> SerResult<()> {
        self.0 = r.read_i64::<BigEndian>().map_err(StreamError::from)?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn SelfSerializable> {
        Box::new(*self)
    }
}

/// A text value, normalised on decode.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringValue(pub String);

impl StringValue {
    /// Stable class id.
    pub const CLASS_ID: ClassId = ClassId(0x7374_7276_616c_7565);
    /// Hard cap on the encoded byte length accepted from a stream.
    pub const MAX_LENGTH: usize = 64 * 1024;

    /// Registry constructor.
    pub fn construct() -> Box<dyn SelfSerializable> {
        Box::<StringValue>::default()
    }
}

impl SelfSerializable for StringValue {
    fn class_id(&self) -> ClassId {
        Self::CLASS_ID
    }

    fn version(&self) -> i32 {
        1
    }

    fn serialize(&self, w: &mut dyn Write) -> SerResult<()> {
        write_normalised_string(w, Some(&self.0))?;
        Ok(())
    }

    fn deserialize(&mut self, r: &mut dyn Read, _version: i32) -> SerResult<()> {
        self.0 = read_normalised_string(r, Self::MAX_LENGTH)?
            .ok_or(StreamError::BadLength(-1))?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn SelfSerializable> {
        Box::new(self.clone())
    }
}

/// An optional point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstantValue(pub Option<EpochInstant>);

impl InstantValue {
    /// Stable class id.
    pub const CLASS_ID: ClassId = ClassId(0x696e_7374_616e_7476);

    /// Registry constructor.
    pub fn construct() -> Box<dyn SelfSerializable> {
        Box::<InstantValue>::default()
    }
}

impl SelfSerializable for InstantValue {
    fn class_id(&self) -> ClassId {
        Self::CLASS_ID
    }

    fn version(&self) -> i32 {
        1
    }

    fn serialize(&self, w: &mut dyn Write) -> SerResult<()> {
        write_instant(w, self.0)?;
        Ok(())
    }

    fn deserialize(&mut self, r: &mut dyn Read, _version: i32) -> SerResult<()> {
        self.0 = read_instant(r)?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn SelfSerializable> {
        Box::new(*self)
    }
}
