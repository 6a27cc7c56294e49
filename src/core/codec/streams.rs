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

//! Read/write primitives over `std::io` streams.
//!
//! Framing rules:
//! - every multi-byte integer is big-endian
//! - collections carry an i32 count, `-1` meaning null
//! - byte arrays may carry an i32 checksum equal to `101 - length`
//! - instants are `i64` epoch seconds (`i64::MIN` => null) plus `i64` nanos

use super::{StreamError, StreamResult, NULL_INSTANT_EPOCH_SECOND, NULL_LIST_ARRAY_LENGTH};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use unicode_normalization::UnicodeNormalization;

/// Largest pre-allocation performed before the stream proves it has the data.
const MAX_PREALLOC: usize = 8 * 1024;

/// Instant as carried on the wire: epoch seconds plus nanosecond remainder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpochInstant {
    /// Seconds since the UNIX epoch (may be negative).
    pub seconds: i64,
    /// Nanosecond remainder in `[0, 999_999_999]`.
    pub nanos: i64,
}

fn checksum_for(length: i32) -> i32 {
    101 - length
}

/// Read a length prefix and validate it against `limit`.
///
/// Returns `None` for the null sentinel. The check happens before any
/// allocation driven by the value.
fn read_length<R: Read + ?Sized>(r: &mut R, limit: usize) -> StreamResult<Option<usize>> {
    let len = r.read_i32::<BigEndian>()?;
    if len == NULL_LIST_ARRAY_LENGTH {
        return Ok(None);
    }
    if len < 0 {
        return Err(StreamError::BadLength(len));
    }
    if len as usize > limit {
        return Err(StreamError::LengthLimitExceeded {
            length: len as i64,
            limit,
        });
    }
    Ok(Some(len as usize))
}

/// Write a byte array with an i32 length prefix (`-1` for null).
pub fn write_byte_array<W: Write + ?Sized>(
    w: &mut W,
    bytes: Option<&[u8]>,
    write_checksum: bool,
) -> StreamResult<()> {
    match bytes {
        None => {
            w.write_i32::<BigEndian>(NULL_LIST_ARRAY_LENGTH)?;
            if write_checksum {
                w.write_i32::<BigEndian>(checksum_for(NULL_LIST_ARRAY_LENGTH))?;
            }
        }
        Some(b) => {
            let len = b.len() as i32;
            w.write_i32::<BigEndian>(len)?;
            if write_checksum {
                w.write_i32::<BigEndian>(checksum_for(len))?;
            }
            w.write_all(b)?;
        }
    }
    Ok(())
}

/// Read a byte array written by [`write_byte_array`].
///
/// `max_len` bounds the length prefix; exceeding it is a protocol error
/// raised before allocation.
pub fn read_byte_array<R: Read + ?Sized>(
    r: &mut R,
    max_len: usize,
    read_checksum: bool,
) -> StreamResult<Option<Vec<u8>>> {
    let len = r.read_i32::<BigEndian>()?;
    if len != NULL_LIST_ARRAY_LENGTH && len < 0 {
        return Err(StreamError::BadLength(len));
    }
    if len >= 0 && len as usize > max_len {
        return Err(StreamError::LengthLimitExceeded {
            length: len as i64,
            limit: max_len,
        });
    }
    if read_checksum {
        let actual = r.read_i32::<BigEndian>()?;
        let expected = checksum_for(len);
        if actual != expected {
            return Err(StreamError::ChecksumMismatch { expected, actual });
        }
    }
    if len == NULL_LIST_ARRAY_LENGTH {
        return Ok(None);
    }
    let len = len as usize;
    let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC));
    let read = (&mut *r).take(len as u64).read_to_end(&mut buf)?;
    if read != len {
        return Err(StreamError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "byte array truncated",
        )));
    }
    Ok(Some(buf))
}

fn write_count<W: Write + ?Sized>(w: &mut W, count: usize) -> StreamResult<()> {
    Ok(w.write_i32::<BigEndian>(count as i32)?)
}

/// Write an i32 list with an i32 count prefix (`-1` for null).
pub fn write_int_list<W: Write + ?Sized>(w: &mut W, list: Option<&[i32]>) -> StreamResult<()> {
    match list {
        None => w.write_i32::<BigEndian>(NULL_LIST_ARRAY_LENGTH)?,
        Some(items) => {
            write_count(w, items.len())?;
            for v in items {
                w.write_i32::<BigEndian>(*v)?;
            }
        }
    }
    Ok(())
}

/// Read an i32 list, bounded by `max_len`.
pub fn read_int_list<R: Read + ?Sized>(r: &mut R, max_len: usize) -> StreamResult<Option<Vec<i32>>> {
    let Some(count) = read_length(r, max_len)? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        out.push(r.read_i32::<BigEndian>()?);
    }
    Ok(Some(out))
}

/// Write an i64 list with an i32 count prefix (`-1` for null).
pub fn write_long_list<W: Write + ?Sized>(w: &mut W, list: Option<&[i64]>) -> StreamResult<()> {
    match list {
        None => w.write_i32::<BigEndian>(NULL_LIST_ARRAY_LENGTH)?,
        Some(items) => {
            write_count(w, items.len())?;
            for v in items {
                w.write_i64::<BigEndian>(*v)?;
            }
        }
    }
    Ok(())
}

/// Read an i64 list, bounded by `max_len`.
pub fn read_long_list<R: Read + ?Sized>(r: &mut R, max_len: usize) -> StreamResult<Option<Vec<i64>>> {
    let Some(count) = read_length(r, max_len)? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        out.push(r.read_i64::<BigEndian>()?);
    }
    Ok(Some(out))
}

/// Write an f32 list with an i32 count prefix (`-1` for null).
pub fn write_float_list<W: Write + ?Sized>(w: &mut W, list: Option<&[f32]>) -> StreamResult<()> {
    match list {
        None => w.write_i32::<BigEndian>(NULL_LIST_ARRAY_LENGTH)?,
        Some(items) => {
            write_count(w, items.len())?;
            for v in items {
                w.write_f32::<BigEndian>(*v)?;
            }
        }
    }
    Ok(())
}

/// Read an f32 list, bounded by `max_len`.
pub fn read_float_list<R: Read + ?Sized>(r: &mut R, max_len: usize) -> StreamResult<Option<Vec<f32>>> {
    let Some(count) = read_length(r, max_len)? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        out.push(r.read_f32::<BigEndian>()?);
    }
    Ok(Some(out))
}

/// Write an f64 list with an i32 count prefix (`-1` for null).
pub fn write_double_list<W: Write + ?Sized>(w: &mut W, list: Option<&[f64]>) -> StreamResult<()> {
    match list {
        None => w.write_i32::<BigEndian>(NULL_LIST_ARRAY_LENGTH)?,
        Some(items) => {
            write_count(w, items.len())?;
            for v in items {
                w.write_f64::<BigEndian>(*v)?;
            }
        }
    }
    Ok(())
}

/// Read an f64 list, bounded by `max_len`.
pub fn read_double_list<R: Read + ?Sized>(
    r: &mut R,
    max_len: usize,
) -> StreamResult<Option<Vec<f64>>> {
    let Some(count) = read_length(r, max_len)? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        out.push(r.read_f64::<BigEndian>()?);
    }
    Ok(Some(out))
}

/// Write a bool list, one byte per element.
pub fn write_bool_list<W: Write + ?Sized>(w: &mut W, list: Option<&[bool]>) -> StreamResult<()> {
    match list {
        None => w.write_i32::<BigEndian>(NULL_LIST_ARRAY_LENGTH)?,
        Some(items) => {
            write_count(w, items.len())?;
            for v in items {
                w.write_u8(u8::from(*v))?;
            }
        }
    }
    Ok(())
}

/// Read a bool list, bounded by `max_len`. Any non-zero byte reads as true.
pub fn read_bool_list<R: Read + ?Sized>(
    r: &mut R,
    max_len: usize,
) -> StreamResult<Option<Vec<bool>>> {
    let Some(count) = read_length(r, max_len)? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        out.push(r.read_u8()? != 0);
    }
    Ok(Some(out))
}

/// Write a list of strings, each as a UTF-8 byte array.
pub fn write_string_list<W: Write + ?Sized, S: AsRef<str>>(
    w: &mut W,
    list: Option<&[S]>,
) -> StreamResult<()> {
    match list {
        None => w.write_i32::<BigEndian>(NULL_LIST_ARRAY_LENGTH)?,
        Some(items) => {
            w.write_i32::<BigEndian>(items.len() as i32)?;
            for item in items {
                write_byte_array(w, Some(item.as_ref().as_bytes()), false)?;
            }
        }
    }
    Ok(())
}

/// Read a list of strings; `max_len` bounds the count, `max_str_len` each
/// string's byte length.
pub fn read_string_list<R: Read + ?Sized>(
    r: &mut R,
    max_len: usize,
    max_str_len: usize,
) -> StreamResult<Option<Vec<String>>> {
    let Some(count) = read_length(r, max_len)? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        let bytes = read_byte_array(r, max_str_len, false)?
            .ok_or(StreamError::BadLength(NULL_LIST_ARRAY_LENGTH))?;
        out.push(String::from_utf8(bytes).map_err(|_| StreamError::InvalidUtf8)?);
    }
    Ok(Some(out))
}

/// Write an optional instant.
pub fn write_instant<W: Write + ?Sized>(
    w: &mut W,
    instant: Option<EpochInstant>,
) -> StreamResult<()> {
    match instant {
        None => w.write_i64::<BigEndian>(NULL_INSTANT_EPOCH_SECOND)?,
        Some(i) => {
            if !(0..=999_999_999).contains(&i.nanos) {
                return Err(StreamError::NanosOutOfRange(i.nanos));
            }
            w.write_i64::<BigEndian>(i.seconds)?;
            w.write_i64::<BigEndian>(i.nanos)?;
        }
    }
    Ok(())
}

/// Read an optional instant, validating the nanosecond range.
pub fn read_instant<R: Read + ?Sized>(r: &mut R) -> StreamResult<Option<EpochInstant>> {
    let seconds = r.read_i64::<BigEndian>()?;
    if seconds == NULL_INSTANT_EPOCH_SECOND {
        return Ok(None);
    }
    let nanos = r.read_i64::<BigEndian>()?;
    if !(0..=999_999_999).contains(&nanos) {
        return Err(StreamError::NanosOutOfRange(nanos));
    }
    Ok(Some(EpochInstant { seconds, nanos }))
}

/// Write an optional string as a UTF-8 byte array.
pub fn write_normalised_string<W: Write + ?Sized>(
    w: &mut W,
    s: Option<&str>,
) -> StreamResult<()> {
    write_byte_array(w, s.map(str::as_bytes), false)
}

/// Read a string and normalise it to NFC.
pub fn read_normalised_string<R: Read + ?Sized>(
    r: &mut R,
    max_len: usize,
) -> StreamResult<Option<String>> {
    let Some(bytes) = read_byte_array(r, max_len, false)? else {
        return Ok(None);
    };
    let s = String::from_utf8(bytes).map_err(|_| StreamError::InvalidUtf8)?;
    Ok(Some(s.nfc().collect()))
}

/// Write a raw i32 marker.
pub fn write_marker_i32<W: Write + ?Sized>(w: &mut W, value: i32) -> StreamResult<()> {
    Ok(w.write_i32::<BigEndian>(value)?)
}

/// Read a raw i32 and require it to equal `expected`.
pub fn read_marker_i32<R: Read + ?Sized>(
    r: &mut R,
    name: &'static str,
    expected: i32,
) -> StreamResult<()> {
    let actual = r.read_i32::<BigEndian>()?;
    if actual != expected {
        return Err(StreamError::InvalidStreamPosition {
            name,
            expected: expected as i64,
            actual: actual as i64,
        });
    }
    Ok(())
}

/// Write a raw i64 marker.
pub fn write_marker_i64<W: Write + ?Sized>(w: &mut W, value: i64) -> StreamResult<()> {
    Ok(w.write_i64::<BigEndian>(value)?)
}

/// Read a raw i64 and require it to equal `expected`.
pub fn read_marker_i64<R: Read + ?Sized>(
    r: &mut R,
    name: &'static str,
    expected: i64,
) -> StreamResult<()> {
    let actual = r.read_i64::<BigEndian>()?;
    if actual != expected {
        return Err(StreamError::InvalidStreamPosition {
            name,
            expected,
            actual,
        });
    }
    Ok(())
}
