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

//! Runtime configuration (TOML). Timeouts and back-pressure parameters are
//! host-supplied inputs; every field has a default.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config read")]
    Read,
    #[error("config parse")]
    Parse,
}

/// Configuration root.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Merkle synchronizer settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Virtual-map pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl RuntimeConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|_| ConfigError::Parse)
    }

    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::Read)?;
        Self::from_toml_str(&raw)
    }
}

fn default_ack_timeout_ms() -> u64 {
    10_000
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_sync_max_nodes() -> usize {
    1_000_000
}
fn default_channel_capacity() -> usize {
    1024
}

/// Merkle synchronizer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long the receiver may wait for an ack before failing.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Bound on a single queue poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Cap on nodes accepted from the far side.
    #[serde(default = "default_sync_max_nodes")]
    pub max_nodes: usize,
    /// Depth of the pump channels between workers.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Frame node records with the debug trailer. Both ends must agree.
    #[serde(default)]
    pub debug_framing: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_nodes: default_sync_max_nodes(),
            channel_capacity: default_channel_capacity(),
            debug_framing: false,
        }
    }
}

impl SyncConfig {
    /// Ack timeout as a duration.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Queue poll bound as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_preferred_queue_size() -> u64 {
    2
}
fn default_backpressure_step_ms() -> u64 {
    5
}
fn default_max_backpressure_ms() -> u64 {
    200
}

/// Virtual-map pipeline settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Flush backlog the pipeline tries to stay under.
    #[serde(default = "default_preferred_queue_size")]
    pub preferred_queue_size: u64,
    /// Back-pressure unit; the sleep grows with the square of the excess.
    #[serde(default = "default_backpressure_step_ms")]
    pub backpressure_step_ms: u64,
    /// Hard cap on a single back-pressure sleep.
    #[serde(default = "default_max_backpressure_ms")]
    pub max_backpressure_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preferred_queue_size: default_preferred_queue_size(),
            backpressure_step_ms: default_backpressure_step_ms(),
            max_backpressure_ms: default_max_backpressure_ms(),
        }
    }
}

impl PipelineConfig {
    /// Back-pressure sleep for a given flush backlog.
    pub fn backpressure_for(&self, flush_backlog: u64) -> Duration {
        let excess = flush_backlog.saturating_sub(self.preferred_queue_size);
        if excess == 0 {
            return Duration::ZERO;
        }
        let sleep_ms = self
            .backpressure_step_ms
            .saturating_mul(excess.saturating_mul(excess))
            .min(self.max_backpressure_ms);
        Duration::from_millis(sleep_ms)
    }
}
