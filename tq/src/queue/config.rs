//! Task queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::QueueError;

/// Task queue configuration
///
/// `None` limits are unbounded. Rate limiting is active only when both
/// `interval_cap` is set and `interval_ms` is non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Max simultaneously running tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Max tasks started per rate window
    #[serde(rename = "interval-cap", skip_serializing_if = "Option::is_none")]
    pub interval_cap: Option<usize>,

    /// Rate window length in milliseconds
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Count still-running tasks against the next rate window
    #[serde(rename = "carryover-concurrency-count")]
    pub carryover_concurrency_count: bool,

    /// Start admitting tasks immediately instead of paused
    #[serde(rename = "auto-start")]
    pub auto_start: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            interval_cap: None,
            interval_ms: 0,
            carryover_concurrency_count: false,
            auto_start: true,
        }
    }
}

impl QueueConfig {
    /// Get the rate window as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Rate limiting is disabled
    pub fn is_interval_ignored(&self) -> bool {
        self.interval_cap.is_none() || self.interval_ms == 0
    }

    /// Reject limits that could never admit a task
    pub fn validate(&self) -> Result<(), QueueError> {
        if let Some(concurrency) = self.concurrency.filter(|c| *c < 1) {
            return Err(QueueError::InvalidConcurrency(concurrency));
        }
        if let Some(cap) = self.interval_cap.filter(|c| *c < 1) {
            return Err(QueueError::InvalidIntervalCap(cap));
        }
        Ok(())
    }
}
