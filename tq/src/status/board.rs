//! Status board: throttled per-item status fetches for a list

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::error::QueueError;
use crate::queue::{QueueConfig, TaskOptions, TrackedQueue};

use super::context::{ContextHandle, ViewContext};
use super::probe::{ProbeError, StatusProbe, StatusReport, WatchItem};

type ProbeUnit = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ProbeError>> + Send>;

/// Collects the status of many items through one throttled queue
///
/// Each item is probed at most once per context: items already queued or
/// started are skipped on refresh. Results that settle after the context
/// changed are dropped.
pub struct StatusBoard {
    queue: TrackedQueue,
    probe: Arc<dyn StatusProbe>,
    context: ContextHandle,
    reports: Arc<Mutex<BTreeMap<String, StatusReport>>>,
    stale: Arc<AtomicU64>,
}

impl StatusBoard {
    pub fn new(config: QueueConfig, probe: Arc<dyn StatusProbe>, context: ContextHandle) -> Result<Self, QueueError> {
        debug!(?config, "StatusBoard::new: called");
        Ok(Self {
            queue: TrackedQueue::new(config)?,
            probe,
            context,
            reports: Arc::new(Mutex::new(BTreeMap::new())),
            stale: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn queue(&self) -> &TrackedQueue {
        &self.queue
    }

    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    /// Submit every item not already queued or probed; returns how many were submitted
    pub async fn refresh(&self, items: &[WatchItem], priority: impl Into<i32>) -> usize {
        let priority = priority.into();
        debug!(count = items.len(), priority, "StatusBoard::refresh: called");

        let mut submitted = 0;
        for item in items {
            let options = TaskOptions::new().with_priority(priority).with_id(item.key.clone());
            if self.queue.add_unique(self.probe_unit(item.clone()), options).await.is_some() {
                submitted += 1;
            }
        }

        debug!(submitted, "StatusBoard::refresh: done");
        submitted
    }

    /// Probe the items again even if they were probed before
    pub async fn reprobe(&self, items: &[WatchItem], priority: impl Into<i32>) -> usize {
        let priority = priority.into();
        debug!(count = items.len(), priority, "StatusBoard::reprobe: called");

        for item in items {
            let options = TaskOptions::new().with_priority(priority).with_id(item.key.clone());
            let _ = self.queue.add(self.probe_unit(item.clone()), options).await;
        }
        items.len()
    }

    /// Switch to a new context
    ///
    /// Queued probes are discarded and the item index starts over; probes
    /// already running will settle as stale.
    pub async fn switch_context(&self, context: ViewContext) {
        let generation = self.context.update(context);
        info!(generation, "StatusBoard::switch_context: context changed");
        self.queue.clear().await;
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Wait until every submitted probe has settled
    pub async fn wait(&self) {
        self.queue.on_idle().await;
    }

    /// Collected reports, ordered by key
    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn report(&self, key: &str) -> Option<StatusReport> {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    /// Results dropped because the context changed while they were in flight
    pub fn stale_count(&self) -> u64 {
        self.stale.load(Ordering::SeqCst)
    }

    fn probe_unit(&self, item: WatchItem) -> ProbeUnit {
        let snapshot = self.context.snapshot();
        let probe = Arc::clone(&self.probe);
        let reports = Arc::clone(&self.reports);
        let stale = Arc::clone(&self.stale);

        Box::new(move || {
            async move {
                let result = probe.probe(snapshot.context(), &item).await;

                if !snapshot.is_current() {
                    debug!(key = %item.key, generation = snapshot.generation(), "StatusBoard: discarding stale result");
                    stale.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }

                let report = StatusReport::from_result(&item.key, &result);
                reports
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(item.key.clone(), report);
                result.map(|_| ())
            }
            .boxed()
        })
    }
}
