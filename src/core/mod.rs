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

//! Core runtime: framing, serialization, merkle model, virtual-map pipeline.

/// Stream framing primitives and stream wrappers.
pub mod codec;
/// Runtime configuration (TOML).
pub mod config;
/// Merkle tree model, iterators, hashing and whole-tree I/O.
pub mod merkle;
/// Class-id polymorphic serialization.
pub mod ser;
/// Shared value types (digests, identifiers).
pub mod types;
/// Virtual-map fast-copies and the lifecycle pipeline.
pub mod virtualmap;
