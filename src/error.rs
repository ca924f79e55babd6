//! Error types for loop setup and loop execution.
use crate::reduction::Reduce;
use std::error::Error;
use std::fmt;

/// A numerical failure raised while processing a single mesh entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFailure {
    pub entity: usize,
    pub message: String,
}

/// Record of the failures suppressed by one or more execution contexts.
///
/// Only the failure with the smallest entity id is kept in full, which makes the merged
/// record independent of the order in which contexts are joined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureLog {
    count: usize,
    first: Option<EntityFailure>,
}

impl FailureLog {
    pub fn record(&mut self, entity: usize, error: &eyre::Report) {
        // Include the full cause chain, like the alternate formatting of eyre reports
        let failure = EntityFailure {
            entity,
            message: format!("{:#}", error),
        };
        self.join(FailureLog {
            count: 1,
            first: Some(failure),
        });
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn first(&self) -> Option<&EntityFailure> {
        self.first.as_ref()
    }

    /// Converts the log into the aggregated loop error, if any failure was recorded.
    pub fn into_error(self) -> Option<LoopError> {
        let count = self.count;
        self.first.map(|failure| LoopError::ComputationFailed {
            failed_entities: count,
            entity: failure.entity,
            message: failure.message,
        })
    }
}

impl Reduce for FailureLog {
    fn join(&mut self, other: Self) {
        self.count += other.count;
        self.first = match (self.first.take(), other.first) {
            (Some(a), Some(b)) => Some(if (b.entity, &b.message) < (a.entity, &a.message) { b } else { a }),
            (a, b) => a.or(b),
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// The problem was misconfigured. Detected before any loop runs.
    Setup(String),
    /// The worker thread pool could not be created.
    ThreadPool(String),
    /// One or more entities failed during the loop. The remaining entities were processed.
    ComputationFailed {
        failed_entities: usize,
        entity: usize,
        message: String,
    },
}

impl LoopError {
    pub fn setup(message: impl Into<String>) -> Self {
        LoopError::Setup(message.into())
    }

    pub fn is_computation_failure(&self) -> bool {
        matches!(self, LoopError::ComputationFailed { .. })
    }
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::Setup(message) => write!(f, "invalid problem setup: {}", message),
            LoopError::ThreadPool(message) => write!(f, "failed to create thread pool: {}", message),
            LoopError::ComputationFailed {
                failed_entities,
                entity,
                message,
            } => write!(
                f,
                "computation failed on {} entities (first failure on entity {}: {})",
                failed_entities, entity, message
            ),
        }
    }
}

impl Error for LoopError {}
