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

//! Asynchronous stream pumps.
//!
//! Each side of the synchronizer wraps its read half and write half in a
//! dedicated worker thread; protocol logic talks to the workers through
//! bounded channels. This gives blocking reads a deadline (the channel poll
//! is interruptible even when the underlying `Read` is not) and gives writes
//! natural back-pressure when the link stalls.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};
use std::thread::JoinHandle;
use std::time::Duration;

const CHUNK: usize = 4096;

/// Read side handle: a `Read` whose pulls come from the pump thread and honor
/// a per-operation timeout.
pub struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
    timeout: Duration,
}

impl ChannelReader {
    /// Change the per-operation timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if self.pos >= self.current.len() {
            match self.rx.recv_timeout(self.timeout) {
                Ok(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(IoError::new(ErrorKind::TimedOut, "stream read timed out"));
                }
                // Pump finished: the stream reached EOF or failed; the pump's
                // join handle carries the distinction.
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = (self.current.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Spawn the inbound pump: a worker thread doing the blocking reads.
pub fn spawn_reader<R>(
    mut inner: R,
    capacity: usize,
    timeout: Duration,
) -> (ChannelReader, JoinHandle<IoResult<()>>)
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded::<Vec<u8>>(capacity);
    let handle = std::thread::spawn(move || {
        loop {
            let mut buf = vec![0u8; CHUNK];
            let n = inner.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            buf.truncate(n);
            if tx.send(buf).is_err() {
                // Consumer went away; nothing left to deliver to.
                return Ok(());
            }
        }
    });
    (
        ChannelReader {
            rx,
            current: Vec::new(),
            pos: 0,
            timeout,
        },
        handle,
    )
}

/// Write side handle: buffers locally, ships a chunk to the pump on `flush`.
pub struct ChannelWriter {
    tx: Sender<Vec<u8>>,
    buf: Vec<u8>,
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.buf);
        self.tx
            .send(chunk)
            .map_err(|_| IoError::new(ErrorKind::BrokenPipe, "write pump gone"))
    }
}

/// Spawn the outbound pump: a worker thread doing the blocking writes.
///
/// Dropping the returned [`ChannelWriter`] closes the channel; the pump
/// flushes and exits.
pub fn spawn_writer<W>(mut inner: W, capacity: usize) -> (ChannelWriter, JoinHandle<IoResult<()>>)
where
    W: Write + Send + 'static,
{
    let (tx, rx) = bounded::<Vec<u8>>(capacity);
    let handle = std::thread::spawn(move || {
        for chunk in rx.iter() {
            inner.write_all(&chunk)?;
            inner.flush()?;
        }
        inner.flush()?;
        Ok(())
    });
    (
        ChannelWriter {
            tx,
            buf: Vec::new(),
        },
        handle,
    )
}
