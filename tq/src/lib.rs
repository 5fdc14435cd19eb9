//! taskqueue - priority task queue with concurrency and rate limits
//!
//! Work is submitted as async closures. The queue buffers them in priority
//! order and starts them as tokio tasks while two gates allow: a bound on how
//! many run at once, and an optional cap on how many start per time window.
//!
//! # Core Concepts
//!
//! - **Priority order**: higher priority first, submission order among equals
//! - **No preemption**: a running task is never interrupted
//! - **Failure isolation**: a task's error reaches only its own handle
//! - **Identity**: tracked queues remember ids so a caller can skip work it
//!   already submitted
//!
//! # Modules
//!
//! - [`queue`] - The scheduler and its configuration
//! - [`buffer`] - Ordered buffers and identity tracking
//! - [`status`] - Throttled per-item status fetches built on the queue
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod buffer;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod queue;
pub mod status;

// Re-export commonly used types
pub use buffer::{IdentityIndex, PriorityBuffer, TaskBuffer, TrackedBuffer};
pub use config::{Config, ProbeConfig};
pub use domain::Priority;
pub use error::{QueueError, TaskError};
pub use queue::{QueueConfig, QueuePhase, QueueState, QueueStats, TaskHandle, TaskOptions, TaskQueue, TrackedQueue};
pub use status::{ContextHandle, HttpProbe, StatusBoard, StatusProbe, StatusReport, ViewContext, WatchItem};
