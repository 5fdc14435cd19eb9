//! Queue error types

use thiserror::Error;

/// Invalid queue configuration, reported at construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Expected `concurrency` to be a number from 1 and up, got {0}")]
    InvalidConcurrency(usize),

    #[error("Expected `interval-cap` to be a number from 1 and up, got {0}")]
    InvalidIntervalCap(usize),
}

/// Why a submitted task did not produce a value
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The work unit returned an error
    #[error("Task failed: {0}")]
    Failed(E),

    /// The work unit panicked, either when called or while running
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// The task was removed from the queue before it started
    #[error("Task discarded before it started")]
    Discarded,
}

impl<E> TaskError<E> {
    /// Check if the task was cleared out of the queue
    pub fn is_discarded(&self) -> bool {
        matches!(self, TaskError::Discarded)
    }

    /// Get the work unit's own error, if that is what this is
    pub fn into_failure(self) -> Option<E> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }
}
