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

//! Tributary - data-plane runtime for a distributed-ledger node.
//!
//! This library provides:
//! - Deterministic, versioned binary serialization with class-id polymorphism
//! - A reference-counted, route-addressed merkle tree model with lazy hashing
//! - Whole-tree serialization driven by pre-order traversal
//! - A teacher/learner merkle synchronization protocol over lossy links
//! - The virtual-map hash/flush/merge lifecycle pipeline with back-pressure
//! - Monitoring via Prometheus metrics and structured logging

/// Core runtime (codec, serialization, merkle model, virtual-map pipeline).
pub mod core;
/// Observability (metrics container).
pub mod monitoring;
/// Wire protocols (merkle synchronizer, reconnect handshake).
pub mod networking;
