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

//! Route addressing: the path of child indices from the root to a node.

use std::fmt;

/// Ordered sequence of child indices addressing a node from the root.
///
/// The root's route is empty. Equality is structural.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MerkleRoute {
    steps: Vec<u32>,
}

impl MerkleRoute {
    /// The empty route (the root).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from explicit steps.
    pub fn from_steps(steps: Vec<u32>) -> Self {
        Self { steps }
    }

    /// The steps, root-first.
    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    /// Number of steps (the node's depth).
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    /// True for the root route.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// New route with one more step appended.
    pub fn extend(&self, step: u32) -> MerkleRoute {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend_from_slice(&self.steps);
        steps.push(step);
        Self { steps }
    }

    /// Route of the parent, or `None` at the root.
    pub fn parent(&self) -> Option<MerkleRoute> {
        if self.steps.is_empty() {
            return None;
        }
        Some(Self {
            steps: self.steps[..self.steps.len() - 1].to_vec(),
        })
    }

    /// True if `prefix` addresses this node or one of its ancestors.
    pub fn starts_with(&self, prefix: &MerkleRoute) -> bool {
        self.steps.len() >= prefix.steps.len()
            && self.steps[..prefix.steps.len()] == prefix.steps[..]
    }
}

impl fmt::Display for MerkleRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "/");
        }
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MerkleRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleRoute({self})")
    }
}
