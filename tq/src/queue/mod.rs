//! Priority task queue
//!
//! Buffers submitted work in priority order and starts it under a
//! concurrency limit and an optional per-window rate limit.

mod config;
mod core;
mod state;
mod task;

pub use config::QueueConfig;
pub use core::{TaskQueue, TrackedQueue};
pub use state::{QueuePhase, QueueState, QueueStats};
pub use task::{Runnable, TaskHandle, TaskOptions};
