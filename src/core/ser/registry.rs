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

//! Class-id to constructor mapping for polymorphic deserialization.
//!
//! Registration happens during process initialization; after `seal()` the
//! registry is read-only. Runtime registration before sealing is published
//! through the lock, so concurrent lookups are safe either way.

use super::class_id::{ClassId, NULL_CLASS_ID};
use super::serializable::SelfSerializable;
use super::{SerError, SerResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Zero-argument constructor producing a default instance of a value class.
pub type Constructor = fn() -> Box<dyn SelfSerializable>;

/// Registration data for an internal (structural) merkle node class.
#[derive(Clone, Copy, Debug)]
pub struct InternalClass {
    /// Current version of the class.
    pub version: i32,
    /// Oldest version this code still decodes.
    pub minimum_supported_version: i32,
    /// Inclusive child-count bounds for a given version.
    pub child_bounds: fn(i32) -> (usize, usize),
}

impl InternalClass {
    /// Validate `version` against the supported range.
    pub fn check_version(&self, class_id: ClassId, version: i32) -> SerResult<()> {
        if version < self.minimum_supported_version || version > self.version {
            return Err(SerError::IllegalVersion {
                class_id,
                version,
                min: self.minimum_supported_version,
                max: self.version,
            });
        }
        Ok(())
    }
}

/// What a class id resolves to.
#[derive(Clone, Copy)]
pub enum Registration {
    /// Leaf or standalone value: a constructor for the concrete type.
    Value(Constructor),
    /// Internal merkle node: structural metadata only.
    Internal(InternalClass),
}

/// Process-wide map from class id to registration.
#[derive(Default)]
pub struct ConstructableRegistry {
    entries: RwLock<HashMap<i64, Registration>>,
    sealed: AtomicBool,
}

impl ConstructableRegistry {
    /// Empty, unsealed registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide registry.
    pub fn global() -> &'static ConstructableRegistry {
        static GLOBAL: OnceLock<ConstructableRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ConstructableRegistry::new)
    }

    fn register(&self, class_id: ClassId, reg: Registration) -> SerResult<()> {
        if class_id == NULL_CLASS_ID {
            return Err(SerError::ReservedClassId(class_id));
        }
        if self.sealed.load(Ordering::Acquire) {
            return Err(SerError::RegistrySealed);
        }
        let mut entries = self.entries.write();
        if entries.contains_key(&class_id.0) {
            return Err(SerError::DuplicateClassId(class_id));
        }
        entries.insert(class_id.0, reg);
        Ok(())
    }

    /// Register a value (or merkle leaf) class.
    pub fn register_value(&self, class_id: ClassId, constructor: Constructor) -> SerResult<()> {
        self.register(class_id, Registration::Value(constructor))
    }

    /// Register an internal merkle node class.
    pub fn register_internal(&self, class_id: ClassId, class: InternalClass) -> SerResult<()> {
        self.register(class_id, Registration::Internal(class))
    }

    /// Freeze the registry; later registrations fail.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Look up a registration.
    pub fn lookup(&self, class_id: ClassId) -> SerResult<Registration> {
        self.entries
            .read()
            .get(&class_id.0)
            .copied()
            .ok_or(SerError::ClassNotFound(class_id))
    }

    /// Construct a default instance of a value class.
    pub fn construct(&self, class_id: ClassId) -> SerResult<Box<dyn SelfSerializable>> {
        match self.lookup(class_id)? {
            Registration::Value(ctor) => Ok(ctor()),
            Registration::Internal(_) => Err(SerError::WrongKind(class_id)),
        }
    }

    /// Resolve an internal node class.
    pub fn internal(&self, class_id: ClassId) -> SerResult<InternalClass> {
        match self.lookup(class_id)? {
            Registration::Internal(class) => Ok(class),
            Registration::Value(_) => Err(SerError::WrongKind(class_id)),
        }
    }

    /// True if the id resolves to an internal node class.
    pub fn is_internal(&self, class_id: ClassId) -> bool {
        matches!(self.lookup(class_id), Ok(Registration::Internal(_)))
    }
}
