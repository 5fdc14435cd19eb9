//! Queue state snapshots

use serde::Serialize;

/// What the admission loop is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueuePhase {
    /// Nothing queued and nothing running
    Idle,

    /// Admitting or running tasks
    Running,

    /// Admission suspended by `pause()`
    Paused,

    /// Tasks are queued but the current rate window is used up
    RateLimited,
}

impl std::fmt::Display for QueuePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::RateLimited => write!(f, "rate-limited"),
        }
    }
}

/// Cumulative counters for the queue
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total_started: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub total_discarded: u64,
    pub peak_queue_depth: usize,
    pub peak_concurrent: usize,
}

impl QueueStats {
    /// Tasks that have run to completion, successfully or not
    pub fn total_settled(&self) -> u64 {
        self.total_succeeded + self.total_failed
    }
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub phase: QueuePhase,
    pub queued: usize,
    pub pending: usize,
    pub interval_count: usize,
    pub stats: QueueStats,
}
