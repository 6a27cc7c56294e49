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

//! Backing stores a flushed fast-copy persists into.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Backing-store errors.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("db open")]
    DbOpen,
    #[error("db io")]
    DbIo,
}

/// A change set: `None` values are deletions.
pub type ChangeSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Where flushed copies persist their contents.
pub trait VirtualDataSource: Send + Sync {
    /// Apply a change set atomically.
    fn store(&self, changes: &ChangeSet) -> Result<(), DataSourceError>;

    /// Read back a value.
    fn load(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DataSourceError>;
}

/// Sled-backed data source.
pub struct SledDataSource {
    db: sled::Db,
}

impl SledDataSource {
    /// Open (or create) the store at `path`.
    pub fn open(path: &str) -> Result<Self, DataSourceError> {
        let db = sled::open(path).map_err(|_| DataSourceError::DbOpen)?;
        Ok(Self { db })
    }
}

impl VirtualDataSource for SledDataSource {
    fn store(&self, changes: &ChangeSet) -> Result<(), DataSourceError> {
        let mut batch = sled::Batch::default();
        for (key, value) in changes {
            match value {
                Some(value) => batch.insert(key.as_slice(), value.as_slice()),
                None => batch.remove(key.as_slice()),
            }
        }
        self.db.apply_batch(batch).map_err(|_| DataSourceError::DbIo)
    }

    fn load(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DataSourceError> {
        let value = self.db.get(key).map_err(|_| DataSourceError::DbIo)?;
        Ok(value.map(|v| v.to_vec()))
    }
}

/// In-memory data source for tests and tooling.
#[derive(Default)]
pub struct MemoryDataSource {
    map: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDataSource {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// True when nothing was stored.
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

impl VirtualDataSource for MemoryDataSource {
    fn store(&self, changes: &ChangeSet) -> Result<(), DataSourceError> {
        let mut map = self.map.lock();
        for (key, value) in changes {
            match value {
                Some(value) => {
                    map.insert(key.clone(), value.clone());
                }
                None => {
                    map.remove(key);
                }
            }
        }
        Ok(())
    }

    fn load(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DataSourceError> {
        Ok(self.map.lock().get(key).cloned())
    }
}
