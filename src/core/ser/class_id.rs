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

//! Stable class identifiers and the reserved sentinels.

use std::fmt;

/// Stable 64-bit identifier of a polymorphic serializable type.
///
/// Chosen at design time and never changed afterwards; versioning happens
/// through the separate version field, not through new ids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(pub i64);

impl ClassId {
    /// Raw value.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({:#x})", self.0)
    }
}

/// Reserved class id marking a null serializable (and the placeholder for
/// absent merkle children). Disjoint from legitimate ids by construction:
/// the registry refuses to register it.
pub const NULL_CLASS_ID: ClassId = ClassId(i64::MIN);

/// Version marker accompanying a null serializable when the class id field
/// is omitted.
pub const NULL_VERSION: i32 = -1;
