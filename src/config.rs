//! Configuration of loop execution.
use serde::{Deserialize, Serialize};

/// What a loop does once an entity has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep processing the remaining entities, so that every failure is diagnosed.
    #[default]
    Continue,
    /// Ask every context to stop at its next entity boundary.
    StopAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Number of worker threads. `0` uses one thread per core, `1` runs the serial path.
    pub num_threads: usize,
    /// Ranges with at most this many entities are processed by a single context.
    pub grain_size: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            grain_size: 64,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl LoopConfig {
    /// A configuration for the serial path.
    pub fn serial() -> Self {
        Self::default().with_num_threads(1)
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_grain_size(mut self, grain_size: usize) -> Self {
        self.grain_size = grain_size.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn is_serial(&self) -> bool {
        self.num_threads == 1
    }
}
