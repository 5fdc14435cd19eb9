//! Throttled status fetching for lists of items
//!
//! The caller side of the task queue: one probe per list item, submitted with
//! the item's key as identity and a priority reflecting urgency. Results that
//! settle after the view context changed are discarded.

mod board;
mod context;
mod probe;

pub use board::StatusBoard;
pub use context::{ContextHandle, ContextSnapshot, ViewContext};
pub use probe::{HttpProbe, ItemStatus, ProbeError, StatusProbe, StatusReport, WatchItem};
