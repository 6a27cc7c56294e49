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

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Node-data messages sent by the synchronizer.
    pub sync_nodes_sent_total: IntCounter,
    /// Node-data messages received by the synchronizer.
    pub sync_nodes_received_total: IntCounter,
    /// Affirmative acks (learner already held the subtree).
    pub sync_acks_affirmative_total: IntCounter,
    /// Negative acks (subtree had to travel).
    pub sync_acks_negative_total: IntCounter,
    /// Bytes written to synchronization links.
    pub sync_bytes_sent_total: IntCounter,
    /// Bytes read from synchronization links.
    pub sync_bytes_received_total: IntCounter,

    /// Copies currently registered in the pipeline.
    pub pipeline_copies: IntGauge,
    /// Copies awaiting flush.
    pub pipeline_flush_backlog: IntGauge,
    /// Flushes performed.
    pub pipeline_flush_total: IntCounter,
    /// Merges performed.
    pub pipeline_merge_total: IntCounter,

    /// Merkle node digests computed.
    pub merkle_hash_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let sync_nodes_sent_total = IntCounter::new(
            "tributary_sync_nodes_sent_total",
            "Node-data messages sent",
        )
        .map_err(|_| MetricsError::Prom)?;
        let sync_nodes_received_total = IntCounter::new(
            "tributary_sync_nodes_received_total",
            "Node-data messages received",
        )
        .map_err(|_| MetricsError::Prom)?;
        let sync_acks_affirmative_total = IntCounter::new(
            "tributary_sync_acks_affirmative_total",
            "Affirmative acks",
        )
        .map_err(|_| MetricsError::Prom)?;
        let sync_acks_negative_total =
            IntCounter::new("tributary_sync_acks_negative_total", "Negative acks")
                .map_err(|_| MetricsError::Prom)?;
        let sync_bytes_sent_total =
            IntCounter::new("tributary_sync_bytes_sent_total", "Bytes sent")
                .map_err(|_| MetricsError::Prom)?;
        let sync_bytes_received_total =
            IntCounter::new("tributary_sync_bytes_received_total", "Bytes received")
                .map_err(|_| MetricsError::Prom)?;

        let pipeline_copies =
            IntGauge::new("tributary_pipeline_copies", "Registered fast-copies")
                .map_err(|_| MetricsError::Prom)?;
        let pipeline_flush_backlog = IntGauge::new(
            "tributary_pipeline_flush_backlog",
            "Copies awaiting flush",
        )
        .map_err(|_| MetricsError::Prom)?;
        let pipeline_flush_total =
            IntCounter::new("tributary_pipeline_flush_total", "Flushes performed")
                .map_err(|_| MetricsError::Prom)?;
        let pipeline_merge_total =
            IntCounter::new("tributary_pipeline_merge_total", "Merges performed")
                .map_err(|_| MetricsError::Prom)?;

        let merkle_hash_total =
            IntCounter::new("tributary_merkle_hash_total", "Node digests computed")
                .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(sync_nodes_sent_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(sync_nodes_received_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(sync_acks_affirmative_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(sync_acks_negative_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(sync_bytes_sent_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(sync_bytes_received_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(pipeline_copies.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(pipeline_flush_backlog.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(pipeline_flush_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(pipeline_merge_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(merkle_hash_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            sync_nodes_sent_total,
            sync_nodes_received_total,
            sync_acks_affirmative_total,
            sync_acks_negative_total,
            sync_bytes_sent_total,
            sync_bytes_received_total,
            pipeline_copies,
            pipeline_flush_backlog,
            pipeline_flush_total,
            pipeline_merge_total,
            merkle_hash_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_once() {
        let m = Metrics::new().unwrap();
        m.sync_nodes_sent_total.inc();
        m.pipeline_copies.set(3);
        let families = m.registry.gather();
        assert!(families.iter().any(|f| f.get_name().contains("sync_nodes_sent")));
    }
}
