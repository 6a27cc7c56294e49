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

//! Fast-copies: copy-on-write snapshots of a virtual map.
//!
//! The newest copy is the single mutable head; `fast_copy` freezes it and
//! starts a new one. Copy digests fold the sorted change set through the
//! merkle leaf/internal digest functions, so virtual-map hashes live in the
//! same digest space as every other tree.

use super::datasource::{ChangeSet, VirtualDataSource};
use super::{PipelineError, PipelineResult};
use crate::core::merkle::hashing::{internal_digest, leaf_digest};
use crate::core::ser::ClassId;
use crate::core::types::Digest;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Class id under which virtual-map contents are hashed.
pub const VIRTUAL_MAP_CLASS_ID: ClassId = ClassId(0x766d_6170);
const VIRTUAL_MAP_VERSION: i32 = 1;

/// Lifecycle surface the pipeline drives.
///
/// Implementations must be safe to observe from any thread; every action is
/// invoked by the pipeline worker (or under its hash lock).
pub trait VirtualRoot: Send + Sync + 'static {
    /// True once the copy refuses mutation.
    fn is_immutable(&self) -> bool;
    /// True once the owner has released the copy.
    fn is_released(&self) -> bool;
    /// True once the copy was split off the normal chain.
    fn is_detached(&self) -> bool;
    /// True when the copy's contents should be persisted rather than merged.
    fn should_be_flushed(&self) -> bool;
    /// True when the copy's contents should fold into its successor.
    fn should_be_merged(&self) -> bool {
        !self.should_be_flushed()
    }
    /// True once persisted.
    fn is_flushed(&self) -> bool;
    /// True once folded into the successor.
    fn is_merged(&self) -> bool;
    /// True once the digest is computed.
    fn is_hashed(&self) -> bool;
    /// Compute the digest; idempotent.
    fn compute_hash(&self) -> PipelineResult<()>;
    /// Persist the contents to the backing store.
    fn flush(&self) -> PipelineResult<()>;
    /// Fold pending changes into the immutable successor. The successor's
    /// own changes win on conflict.
    fn merge_into(&self, next: &Self) -> PipelineResult<()>;
    /// Pipeline shutdown notification.
    fn on_shutdown(&self, _immediately: bool) {}
}

/// One fast-copy of a [`VirtualMap`].
pub struct VirtualMapCopy {
    ordinal: u64,
    changes: Mutex<ChangeSet>,
    hash: Mutex<Option<Digest>>,
    data_source: Arc<dyn VirtualDataSource>,
    immutable: AtomicBool,
    released: AtomicBool,
    detached: AtomicBool,
    flushed: AtomicBool,
    merged: AtomicBool,
    should_flush: AtomicBool,
    shutdown_seen: AtomicBool,
}

impl VirtualMapCopy {
    fn new(ordinal: u64, data_source: Arc<dyn VirtualDataSource>, should_flush: bool) -> Self {
        Self {
            ordinal,
            changes: Mutex::new(ChangeSet::new()),
            hash: Mutex::new(None),
            data_source,
            immutable: AtomicBool::new(false),
            released: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            flushed: AtomicBool::new(false),
            merged: AtomicBool::new(false),
            should_flush: AtomicBool::new(should_flush),
            shutdown_seen: AtomicBool::new(false),
        }
    }

    /// Position in the fast-copy chain (0 = first).
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// The copy's digest once computed.
    pub fn hash(&self) -> Option<Digest> {
        *self.hash.lock()
    }

    /// Mark whether this copy should be flushed instead of merged.
    pub fn set_should_flush(&self, flush: bool) {
        self.should_flush.store(flush, Ordering::Release);
    }

    /// Owner is done with this copy.
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// Split the copy off the normal chain so it no longer blocks
    /// merges and flushes of its neighbors.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    /// True once the pipeline delivered a shutdown notification.
    pub fn shutdown_seen(&self) -> bool {
        self.shutdown_seen.load(Ordering::Acquire)
    }

    fn seal(&self) {
        self.immutable.store(true, Ordering::Release);
    }

    fn put_change(&self, key: Vec<u8>, value: Option<Vec<u8>>) -> PipelineResult<()> {
        if self.is_immutable() {
            return Err(PipelineError::Lifecycle("copy is immutable".to_string()));
        }
        self.changes.lock().insert(key, value);
        Ok(())
    }

    fn lookup(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.changes.lock().get(key).cloned()
    }
}

/// Digest of a change set: sorted entries folded pairwise, the way a binary
/// merkle level fold works.
fn changes_digest(changes: &ChangeSet) -> Digest {
    if changes.is_empty() {
        return Digest::ZERO;
    }
    let mut level: Vec<Digest> = changes
        .iter()
        .map(|(key, value)| {
            let mut payload = Vec::with_capacity(key.len() + 8);
            payload.extend_from_slice(&(key.len() as u32).to_be_bytes());
            payload.extend_from_slice(key);
            match value {
                Some(value) => {
                    payload.push(1);
                    payload.extend_from_slice(value);
                }
                None => payload.push(0),
            }
            leaf_digest(VIRTUAL_MAP_CLASS_ID, VIRTUAL_MAP_VERSION, &payload)
        })
        .collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            next.push(internal_digest(
                VIRTUAL_MAP_CLASS_ID,
                VIRTUAL_MAP_VERSION,
                &[pair[0], right],
            ));
        }
        level = next;
    }
    level[0]
}

impl VirtualRoot for VirtualMapCopy {
    fn is_immutable(&self) -> bool {
        self.immutable.load(Ordering::Acquire)
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    fn should_be_flushed(&self) -> bool {
        self.should_flush.load(Ordering::Acquire)
    }

    fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire)
    }

    fn is_merged(&self) -> bool {
        self.merged.load(Ordering::Acquire)
    }

    fn is_hashed(&self) -> bool {
        self.hash.lock().is_some()
    }

    fn compute_hash(&self) -> PipelineResult<()> {
        let mut hash = self.hash.lock();
        if hash.is_none() {
            *hash = Some(changes_digest(&self.changes.lock()));
        }
        Ok(())
    }

    fn flush(&self) -> PipelineResult<()> {
        if self.is_merged() {
            return Err(PipelineError::Lifecycle(
                "merged copy cannot flush".to_string(),
            ));
        }
        self.data_source.store(&self.changes.lock())?;
        self.flushed.store(true, Ordering::Release);
        debug!(ordinal = self.ordinal, "copy flushed");
        Ok(())
    }

    fn merge_into(&self, next: &Self) -> PipelineResult<()> {
        if self.is_flushed() {
            return Err(PipelineError::Lifecycle(
                "flushed copy cannot merge".to_string(),
            ));
        }
        if !next.is_immutable() {
            return Err(PipelineError::Lifecycle(
                "merge target must be immutable".to_string(),
            ));
        }
        let ours = self.changes.lock();
        let mut theirs = next.changes.lock();
        for (key, value) in ours.iter() {
            // The successor's own writes win.
            theirs.entry(key.clone()).or_insert_with(|| value.clone());
        }
        // The successor's contents changed; its digest must be recomputed.
        *next.hash.lock() = None;
        self.merged.store(true, Ordering::Release);
        debug!(from = self.ordinal, into = next.ordinal, "copy merged");
        Ok(())
    }

    fn on_shutdown(&self, immediately: bool) {
        self.shutdown_seen.store(true, Ordering::Release);
        debug!(ordinal = self.ordinal, immediately, "copy notified of shutdown");
    }
}

/// Copy-on-write byte-keyed map with one mutable head.
pub struct VirtualMap {
    data_source: Arc<dyn VirtualDataSource>,
    chain: Mutex<Vec<Arc<VirtualMapCopy>>>,
    next_ordinal: Mutex<u64>,
}

impl VirtualMap {
    /// New map over the given backing store.
    pub fn new(data_source: Arc<dyn VirtualDataSource>) -> Self {
        let head = Arc::new(VirtualMapCopy::new(0, data_source.clone(), false));
        Self {
            data_source,
            chain: Mutex::new(vec![head]),
            next_ordinal: Mutex::new(1),
        }
    }

    /// The current mutable head.
    pub fn head(&self) -> Arc<VirtualMapCopy> {
        let mut chain = self.chain.lock();
        if let Some(head) = chain.last() {
            return head.clone();
        }
        let mut ordinal = self.next_ordinal.lock();
        let head = Arc::new(VirtualMapCopy::new(
            *ordinal,
            self.data_source.clone(),
            false,
        ));
        *ordinal += 1;
        chain.push(head.clone());
        head
    }

    /// Write a key into the mutable head.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> PipelineResult<()> {
        self.head().put_change(key, Some(value))
    }

    /// Delete a key in the mutable head.
    pub fn delete(&self, key: Vec<u8>) -> PipelineResult<()> {
        self.head().put_change(key, None)
    }

    /// Read through the copy chain (newest first), then the backing store.
    pub fn get(&self, key: &[u8]) -> PipelineResult<Option<Vec<u8>>> {
        let chain = self.chain.lock().clone();
        for copy in chain.iter().rev() {
            if copy.is_merged() {
                continue;
            }
            if let Some(found) = copy.lookup(key) {
                return Ok(found);
            }
        }
        Ok(self.data_source.load(key)?)
    }

    /// Freeze the head and start a new mutable one. Returns the frozen copy,
    /// ready to be registered with the pipeline.
    pub fn fast_copy(&self) -> Arc<VirtualMapCopy> {
        let mut chain = self.chain.lock();
        let mut ordinal = self.next_ordinal.lock();
        let frozen = match chain.last() {
            Some(head) => {
                head.seal();
                head.clone()
            }
            None => {
                let orphan =
                    Arc::new(VirtualMapCopy::new(*ordinal, self.data_source.clone(), false));
                *ordinal += 1;
                orphan.seal();
                chain.push(orphan.clone());
                orphan
            }
        };
        let head = Arc::new(VirtualMapCopy::new(
            *ordinal,
            self.data_source.clone(),
            false,
        ));
        *ordinal += 1;
        chain.push(head);
        frozen
    }

    /// Drop chain entries that finished their lifecycle.
    pub fn prune(&self) {
        self.chain
            .lock()
            .retain(|c| !(c.is_released() && (c.is_flushed() || c.is_merged())));
    }
}

#[cfg(test)]
mod tests {
    use super::super::datasource::MemoryDataSource;
    use super::*;

    fn map() -> VirtualMap {
        VirtualMap::new(Arc::new(MemoryDataSource::new()))
    }

    #[test]
    fn head_is_mutable_older_copies_are_not() {
        let map = map();
        map.put(b"k".to_vec(), b"v1".to_vec()).unwrap();
        let frozen = map.fast_copy();
        assert!(frozen.is_immutable());
        assert!(frozen.put_change(b"k".to_vec(), None).is_err());
        map.put(b"k".to_vec(), b"v2".to_vec()).unwrap();
        assert_eq!(map.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn digest_is_deterministic_and_content_sensitive() {
        let map_a = map();
        map_a.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        let copy_a = map_a.fast_copy();
        copy_a.compute_hash().unwrap();

        let map_b = map();
        map_b.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        let copy_b = map_b.fast_copy();
        copy_b.compute_hash().unwrap();
        assert_eq!(copy_a.hash(), copy_b.hash());

        let map_c = map();
        map_c.put(b"a".to_vec(), b"2".to_vec()).unwrap();
        let copy_c = map_c.fast_copy();
        copy_c.compute_hash().unwrap();
        assert_ne!(copy_a.hash(), copy_c.hash());
    }

    #[test]
    fn merge_prefers_successor_writes() {
        let map = map();
        map.put(b"k".to_vec(), b"old".to_vec()).unwrap();
        map.put(b"only-old".to_vec(), b"x".to_vec()).unwrap();
        let older = map.fast_copy();
        map.put(b"k".to_vec(), b"new".to_vec()).unwrap();
        let newer = map.fast_copy();

        older.merge_into(&newer).unwrap();
        assert!(older.is_merged());
        assert_eq!(newer.lookup(b"k").unwrap(), Some(b"new".to_vec()));
        assert_eq!(newer.lookup(b"only-old").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn flushed_and_merged_are_mutually_exclusive() {
        let map = map();
        map.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        let older = map.fast_copy();
        let newer = map.fast_copy();
        drop(newer);

        older.flush().unwrap();
        let head = map.head();
        head.seal();
        assert!(older.merge_into(&head).is_err());
    }

    #[test]
    fn flush_persists_to_the_data_source() {
        let source = Arc::new(MemoryDataSource::new());
        let map = VirtualMap::new(source.clone());
        map.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        map.delete(b"gone".to_vec()).unwrap();
        let copy = map.fast_copy();
        copy.flush().unwrap();
        assert_eq!(source.load(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(source.load(b"gone").unwrap(), None);
    }
}
