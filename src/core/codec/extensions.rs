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

//! Byte-counting and hashing wrappers over `Read`/`Write` streams.
//!
//! Counters are shared atomics so another thread (metrics, the synchronizer
//! summary) can observe progress while I/O is in flight.

use crate::core::types::{Digest, DIGEST_LENGTH};
use ring::digest;
use std::io::{Read, Result as IoResult, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared byte counter handle.
#[derive(Clone, Debug, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    /// New counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes observed so far.
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
}

/// Reader counting every byte pulled through it.
pub struct CountingReader<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R: Read> CountingReader<R> {
    /// Wrap `inner`, observing into `counter`.
    pub fn new(inner: R, counter: ByteCounter) -> Self {
        Self { inner, counter }
    }

    /// Unwrap the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

/// Writer counting every byte pushed through it.
pub struct CountingWriter<W> {
    inner: W,
    counter: ByteCounter,
}

impl<W: Write> CountingWriter<W> {
    /// Wrap `inner`, observing into `counter`.
    pub fn new(inner: W, counter: ByteCounter) -> Self {
        Self { inner, counter }
    }

    /// Unwrap the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        let n = self.inner.write(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}

fn digest_from_ring(d: digest::Digest) -> Digest {
    let mut out = [0u8; DIGEST_LENGTH];
    out.copy_from_slice(d.as_ref());
    Digest::from_bytes(out)
}

/// Reader feeding every byte through a SHA-384 context.
pub struct HashingReader<R> {
    inner: R,
    ctx: digest::Context,
}

impl<R: Read> HashingReader<R> {
    /// Wrap `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            ctx: digest::Context::new(&digest::SHA384),
        }
    }

    /// Consume the wrapper, returning the digest of everything read.
    pub fn finish(self) -> Digest {
        digest_from_ring(self.ctx.finish())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let n = self.inner.read(buf)?;
        self.ctx.update(&buf[..n]);
        Ok(n)
    }
}

/// Writer feeding every byte through a SHA-384 context.
pub struct HashingWriter<W> {
    inner: W,
    ctx: digest::Context,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            ctx: digest::Context::new(&digest::SHA384),
        }
    }

    /// Consume the wrapper, returning the digest of everything written.
    pub fn finish(self) -> Digest {
        digest_from_ring(self.ctx.finish())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        let n = self.inner.write(buf)?;
        self.ctx.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}
