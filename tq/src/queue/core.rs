//! TaskQueue implementation

use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::buffer::{IdentityIndex, PriorityBuffer, TaskBuffer, TrackedBuffer};
use crate::error::{QueueError, TaskError};

use super::config::QueueConfig;
use super::state::{QueuePhase, QueueState, QueueStats};
use super::task::{Outcome, Runnable, TaskHandle, TaskOptions, package};

/// A task queue whose buffer records ids for de-duplication
pub type TrackedQueue<K = String> = TaskQueue<K, TrackedBuffer<Runnable, K>>;

/// State touched only by the handlers below, always under the lock
struct QueueInner<B> {
    buffer: B,

    /// Started, not yet settled
    pending: usize,

    /// Started within the current rate window
    interval_count: usize,

    paused: bool,

    /// Periodic rate-window ticker, armed while tasks keep arriving
    ticker: Option<JoinHandle<()>>,

    /// Bumped whenever the ticker is armed or disarmed; a ticker task whose
    /// epoch no longer matches stops
    ticker_epoch: u64,

    /// One-shot timer finishing a window that was open when the ticker stopped
    resume: Option<JoinHandle<()>>,

    /// End of the most recent rate window
    interval_end: Option<Instant>,

    empty_waiters: Vec<oneshot::Sender<()>>,
    idle_waiters: Vec<oneshot::Sender<()>>,

    stats: QueueStats,
}

impl<B> Drop for QueueInner<B> {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(resume) = self.resume.take() {
            resume.abort();
        }
    }
}

struct Shared<K, B> {
    config: QueueConfig,
    inner: Mutex<QueueInner<B>>,
    _id: PhantomData<fn() -> K>,
}

/// Priority-ordered task queue with concurrency and rate limits
///
/// Submitted work is buffered in priority order and started as tokio tasks
/// while the concurrency limit and the current rate window allow. The handle
/// is cheap to clone; every clone drives the same queue.
pub struct TaskQueue<K = String, B = PriorityBuffer<Runnable, K>> {
    shared: Arc<Shared<K, B>>,
}

impl<K, B> Clone for TaskQueue<K, B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, B> TaskQueue<K, B>
where
    K: Send + 'static,
    B: TaskBuffer<Runnable, K>,
{
    /// Create a new queue, rejecting limits that could never admit a task
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        debug!(?config, "TaskQueue::new: called");
        config.validate()?;

        let inner = QueueInner {
            buffer: B::default(),
            pending: 0,
            interval_count: 0,
            paused: !config.auto_start,
            ticker: None,
            ticker_epoch: 0,
            resume: None,
            interval_end: None,
            empty_waiters: Vec::new(),
            idle_waiters: Vec::new(),
            stats: QueueStats::default(),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(inner),
                _id: PhantomData,
            }),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Submit a task
    ///
    /// The returned handle resolves to the task's own outcome. A failing task
    /// affects nothing but its handle.
    pub async fn add<F, Fut, T, E>(&self, work: F, options: TaskOptions<K>) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        debug!(priority = options.priority, "TaskQueue::add: called");
        let (runnable, handle) = package(work);

        let mut inner = self.shared.inner.lock().await;
        self.shared.enqueue(&mut inner, runnable, options);
        handle
    }

    /// Submit every task with the same options and wait for all of them
    ///
    /// Resolves with the first failure as soon as one occurs; the remaining
    /// tasks keep running to completion regardless.
    pub async fn add_all<I, F, Fut, T, E>(&self, works: I, options: TaskOptions<K>) -> Result<Vec<T>, TaskError<E>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        K: Clone,
    {
        debug!(priority = options.priority, "TaskQueue::add_all: called");
        let mut handles = Vec::new();
        {
            let mut inner = self.shared.inner.lock().await;
            for work in works {
                let (runnable, handle) = package(work);
                self.shared.enqueue(&mut inner, runnable, options.clone());
                handles.push(handle);
            }
        }

        debug!(count = handles.len(), "TaskQueue::add_all: submitted, waiting");
        try_join_all(handles).await
    }

    /// Resume admission; no-op if not paused
    pub async fn start(&self) {
        debug!("TaskQueue::start: called");
        let mut inner = self.shared.inner.lock().await;
        if !inner.paused {
            return;
        }
        inner.paused = false;
        self.shared.drain(&mut inner);
    }

    /// Stop admitting new tasks; running tasks are unaffected
    pub async fn pause(&self) {
        debug!("TaskQueue::pause: called");
        self.shared.inner.lock().await.paused = true;
    }

    /// Discard every task that has not started yet
    ///
    /// Handles of discarded tasks resolve with [`TaskError::Discarded`].
    /// Running tasks, counters and timers are left alone. The buffer is
    /// always replaced by a fresh one, so identity tracking starts over even
    /// when nothing was queued; apart from that, clearing an empty queue
    /// changes nothing.
    pub async fn clear(&self) {
        debug!("TaskQueue::clear: called");
        let mut inner = self.shared.inner.lock().await;
        let discarded = inner.buffer.size();

        // A fresh buffer also forgets the ids an identity index recorded
        inner.buffer.clear();
        if discarded == 0 {
            return;
        }

        inner.stats.total_discarded += discarded as u64;
        debug!(discarded, "TaskQueue::clear: buffer cleared");
        Shared::<K, B>::resolve_waiters(&mut inner);
    }

    /// Wait until nothing is queued
    ///
    /// Returns immediately if the buffer is already empty.
    pub async fn on_empty(&self) {
        debug!("TaskQueue::on_empty: called");
        let rx = {
            let mut inner = self.shared.inner.lock().await;
            if inner.buffer.is_empty() {
                return;
            }
            let (tx, rx) = oneshot::channel();
            inner.empty_waiters.push(tx);
            rx
        };
        let _ = rx.await;
    }

    /// Wait until nothing is queued and nothing is running
    ///
    /// Returns immediately if the queue is already idle.
    pub async fn on_idle(&self) {
        debug!("TaskQueue::on_idle: called");
        let rx = {
            let mut inner = self.shared.inner.lock().await;
            if inner.buffer.is_empty() && inner.pending == 0 {
                return;
            }
            let (tx, rx) = oneshot::channel();
            inner.idle_waiters.push(tx);
            rx
        };
        let _ = rx.await;
    }

    /// Number of queued tasks
    pub async fn size(&self) -> usize {
        self.shared.inner.lock().await.buffer.size()
    }

    /// Number of running tasks
    pub async fn pending(&self) -> usize {
        self.shared.inner.lock().await.pending
    }

    pub async fn is_paused(&self) -> bool {
        self.shared.inner.lock().await.paused
    }

    pub async fn phase(&self) -> QueuePhase {
        let inner = self.shared.inner.lock().await;
        self.shared.phase(&inner)
    }

    /// Get current queue state
    pub async fn queue_state(&self) -> QueueState {
        debug!("TaskQueue::queue_state: called");
        let inner = self.shared.inner.lock().await;
        QueueState {
            phase: self.shared.phase(&inner),
            queued: inner.buffer.size(),
            pending: inner.pending,
            interval_count: inner.interval_count,
            stats: inner.stats.clone(),
        }
    }

    pub async fn stats(&self) -> QueueStats {
        self.shared.inner.lock().await.stats.clone()
    }
}

impl<K, B> TaskQueue<K, B>
where
    K: Send + 'static,
    B: TaskBuffer<Runnable, K> + IdentityIndex<K>,
{
    /// The id is queued or has already been started
    pub async fn is_inserted(&self, id: &K) -> bool {
        self.shared.inner.lock().await.buffer.is_inserted(id)
    }

    pub async fn is_pending(&self, id: &K) -> bool {
        self.shared.inner.lock().await.buffer.is_pending(id)
    }

    pub async fn is_processed(&self, id: &K) -> bool {
        self.shared.inner.lock().await.buffer.is_processed(id)
    }

    /// Submit a task unless its id has already been inserted
    ///
    /// The check and the submission happen under one lock, so two callers
    /// racing on the same id cannot both submit. Tasks without an id are
    /// always submitted.
    pub async fn add_unique<F, Fut, T, E>(&self, work: F, options: TaskOptions<K>) -> Option<TaskHandle<T, E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        debug!(priority = options.priority, "TaskQueue::add_unique: called");
        let mut inner = self.shared.inner.lock().await;
        if options.id.as_ref().is_some_and(|id| inner.buffer.is_inserted(id)) {
            debug!("TaskQueue::add_unique: id already inserted, skipping");
            return None;
        }

        let (runnable, handle) = package(work);
        self.shared.enqueue(&mut inner, runnable, options);
        Some(handle)
    }
}

impl<K, B> Shared<K, B>
where
    K: Send + 'static,
    B: TaskBuffer<Runnable, K>,
{
    fn enqueue(self: &Arc<Self>, inner: &mut QueueInner<B>, runnable: Runnable, options: TaskOptions<K>) {
        inner.buffer.enqueue(runnable, options.priority, options.id);
        inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(inner.buffer.size());
        self.try_to_start_another(inner);
    }

    fn interval_ignored(&self) -> bool {
        self.config.is_interval_ignored()
    }

    fn interval_allows_another(&self, inner: &QueueInner<B>) -> bool {
        match self.config.interval_cap {
            Some(cap) if !self.interval_ignored() => inner.interval_count < cap,
            _ => true,
        }
    }

    fn concurrency_allows_another(&self, inner: &QueueInner<B>) -> bool {
        self.config.concurrency.is_none_or(|limit| inner.pending < limit)
    }

    /// Count a new window starts from
    fn window_start_count(&self, inner: &QueueInner<B>) -> usize {
        if self.config.carryover_concurrency_count {
            inner.pending
        } else {
            0
        }
    }

    fn phase(&self, inner: &QueueInner<B>) -> QueuePhase {
        if inner.paused {
            QueuePhase::Paused
        } else if inner.buffer.is_empty() && inner.pending == 0 {
            QueuePhase::Idle
        } else if !inner.buffer.is_empty() && (inner.resume.is_some() || !self.interval_allows_another(inner)) {
            QueuePhase::RateLimited
        } else {
            QueuePhase::Running
        }
    }

    /// Admit everything the gates allow
    fn drain(self: &Arc<Self>, inner: &mut QueueInner<B>) {
        while self.try_to_start_another(inner) {}
    }

    /// Start the head task if every gate is open
    ///
    /// Returns false when nothing was started. Finding the buffer empty stops
    /// the ticker; emptying it or finding it empty releases waiters.
    fn try_to_start_another(self: &Arc<Self>, inner: &mut QueueInner<B>) -> bool {
        if inner.buffer.is_empty() {
            Self::clear_ticker(inner);
            Self::resolve_waiters(inner);
            return false;
        }

        if inner.paused {
            return false;
        }

        let can_arm_ticker = !self.window_still_open(inner);
        if !(self.interval_allows_another(inner) && self.concurrency_allows_another(inner)) {
            trace!(
                pending = inner.pending,
                interval_count = inner.interval_count,
                "Shared::try_to_start_another: gate closed"
            );
            return false;
        }

        let Some(runnable) = inner.buffer.dequeue() else {
            return false;
        };

        inner.pending += 1;
        inner.interval_count += 1;
        inner.stats.total_started += 1;
        inner.stats.peak_concurrent = inner.stats.peak_concurrent.max(inner.pending);
        self.spawn_task(runnable);

        if can_arm_ticker {
            self.arm_ticker_if_needed(inner);
        }
        if inner.buffer.is_empty() {
            Self::resolve_waiters(inner);
        }
        true
    }

    /// With the ticker stopped, decide whether the last window is still open
    ///
    /// An open window arms the resume timer; an expired one resets the count.
    fn window_still_open(self: &Arc<Self>, inner: &mut QueueInner<B>) -> bool {
        if self.interval_ignored() || inner.ticker.is_some() {
            return false;
        }

        match inner.interval_end {
            Some(end) if end > Instant::now() => {
                if inner.resume.is_none() {
                    trace!("Shared::window_still_open: arming resume timer");
                    inner.resume = Some(self.spawn_resume(end));
                }
                true
            }
            _ => {
                inner.interval_count = self.window_start_count(inner);
                false
            }
        }
    }

    fn arm_ticker_if_needed(self: &Arc<Self>, inner: &mut QueueInner<B>) {
        if self.interval_ignored() || inner.ticker.is_some() {
            return;
        }

        let interval = self.config.interval();
        let start = Instant::now();
        inner.ticker_epoch += 1;
        inner.interval_end = Some(start + interval);
        inner.ticker = Some(self.spawn_ticker(start, interval, inner.ticker_epoch));
        trace!(epoch = inner.ticker_epoch, "Shared::arm_ticker_if_needed: ticker armed");
    }

    fn clear_ticker(inner: &mut QueueInner<B>) {
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
            inner.ticker_epoch += 1;
            trace!("Shared::clear_ticker: ticker disarmed");
        }
    }

    /// A rate window elapsed
    fn on_interval(self: &Arc<Self>, inner: &mut QueueInner<B>) {
        if inner.interval_count == 0 && inner.pending == 0 {
            Self::clear_ticker(inner);
        }

        let now = Instant::now();
        inner.interval_end = Some(if inner.ticker.is_some() {
            now + self.config.interval()
        } else {
            now
        });
        inner.interval_count = self.window_start_count(inner);
        self.drain(inner);
    }

    /// The window that was open when the ticker stopped has now ended
    fn on_resume_interval(self: &Arc<Self>, inner: &mut QueueInner<B>) {
        inner.resume = None;
        self.on_interval(inner);
        self.arm_ticker_if_needed(inner);
    }

    fn resolve_waiters(inner: &mut QueueInner<B>) {
        for tx in inner.empty_waiters.drain(..) {
            let _ = tx.send(());
        }

        if inner.pending == 0 {
            for tx in inner.idle_waiters.drain(..) {
                let _ = tx.send(());
            }
        }
    }

    /// A started task finished, successfully or not
    fn on_settled(self: &Arc<Self>, inner: &mut QueueInner<B>, outcome: Outcome) {
        inner.pending = inner.pending.saturating_sub(1);
        match outcome {
            Outcome::Succeeded => inner.stats.total_succeeded += 1,
            Outcome::Failed => inner.stats.total_failed += 1,
        }
        self.try_to_start_another(inner);
    }

    fn spawn_task(self: &Arc<Self>, runnable: Runnable) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let settlement = runnable.run().await;
            let mut inner = shared.inner.lock().await;
            shared.on_settled(&mut inner, settlement.outcome);
            settlement.deliver();
        });
    }

    fn spawn_ticker(self: &Arc<Self>, start: Instant, period: Duration, epoch: u64) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let mut inner = shared.inner.lock().await;
                if inner.ticker_epoch != epoch {
                    break;
                }
                shared.on_interval(&mut inner);
                if inner.ticker_epoch != epoch {
                    break;
                }
            }
        })
    }

    fn spawn_resume(self: &Arc<Self>, end: Instant) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(end).await;
            if let Some(shared) = weak.upgrade() {
                let mut inner = shared.inner.lock().await;
                shared.on_resume_interval(&mut inner);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    type Log = Arc<StdMutex<Vec<&'static str>>>;

    fn recorder(log: Log, name: &'static str) -> impl FnOnce() -> futures::future::Ready<Result<(), String>> {
        move || {
            log.lock().unwrap().push(name);
            futures::future::ready(Ok(()))
        }
    }

    /// Let every runnable task reach its next await point
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    /// A task that finishes when the returned sender fires
    fn gated() -> (oneshot::Sender<()>, impl FnOnce() -> BoxedUnit) {
        let (tx, rx) = oneshot::channel::<()>();
        let work = move || -> BoxedUnit {
            Box::pin(async move {
                let _ = rx.await;
                Ok(())
            })
        };
        (tx, work)
    }

    type BoxedUnit = futures::future::BoxFuture<'static, Result<(), String>>;

    #[test]
    fn test_invalid_config_fails_construction() {
        let result: Result<TaskQueue, _> = TaskQueue::new(QueueConfig {
            concurrency: Some(0),
            ..Default::default()
        });
        assert!(matches!(result, Err(QueueError::InvalidConcurrency(0))));

        let result: Result<TaskQueue, _> = TaskQueue::new(QueueConfig {
            interval_cap: Some(0),
            ..Default::default()
        });
        assert!(matches!(result, Err(QueueError::InvalidIntervalCap(0))));
    }

    #[tokio::test]
    async fn test_add_returns_value() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig::default()).unwrap();
        let handle = queue.add(|| async { Ok::<_, String>("done") }, TaskOptions::default()).await;

        assert_eq!(handle.await.unwrap(), "done");
        assert_eq!(queue.stats().await.total_succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_order_after_start() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(1),
            auto_start: false,
            ..Default::default()
        })
        .unwrap();
        let log: Log = Arc::default();

        let _a = queue.add(recorder(log.clone(), "A"), TaskOptions::new().with_priority(2)).await;
        let _b = queue.add(recorder(log.clone(), "B"), TaskOptions::new().with_priority(1)).await;
        let _c = queue.add(recorder(log.clone(), "C"), TaskOptions::new().with_priority(1)).await;
        assert_eq!(queue.size().await, 3);
        assert_eq!(queue.phase().await, QueuePhase::Paused);

        queue.start().await;
        queue.on_idle().await;

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(2),
            ..Default::default()
        })
        .unwrap();

        let mut triggers = Vec::new();
        for _ in 0..5 {
            let (tx, work) = gated();
            triggers.push(tx);
            let _ = queue.add(work, TaskOptions::default()).await;
        }

        assert_eq!(queue.pending().await, 2);
        assert_eq!(queue.size().await, 3);

        triggers.remove(0).send(()).unwrap();
        settle().await;

        assert_eq!(queue.pending().await, 2);
        assert_eq!(queue.size().await, 2);
        assert_eq!(queue.stats().await.peak_concurrent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_bound() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            interval_cap: Some(1),
            interval_ms: 100,
            ..Default::default()
        })
        .unwrap();
        let origin = Instant::now();
        let starts: Arc<StdMutex<Vec<Duration>>> = Arc::default();

        for _ in 0..3 {
            let starts = Arc::clone(&starts);
            let _ = queue
                .add(
                    move || async move {
                        starts.lock().unwrap().push(origin.elapsed());
                        Ok::<_, String>(())
                    },
                    TaskOptions::default(),
                )
                .await;
        }

        settle().await;
        assert_eq!(starts.lock().unwrap().len(), 1);
        assert_eq!(queue.phase().await, QueuePhase::RateLimited);

        queue.on_idle().await;
        let elapsed = origin.elapsed();
        let starts = starts.lock().unwrap().clone();

        assert_eq!(starts.len(), 3);
        assert!(starts[1] >= Duration::from_millis(100));
        assert!(starts[2] >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_window_resumes_after_ticker_stopped() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            interval_cap: Some(1),
            interval_ms: 100,
            ..Default::default()
        })
        .unwrap();
        let origin = Instant::now();
        let starts: Arc<StdMutex<Vec<Duration>>> = Arc::default();
        let timed = move |starts: Arc<StdMutex<Vec<Duration>>>| {
            move || async move {
                starts.lock().unwrap().push(origin.elapsed());
                Ok::<_, String>(())
            }
        };

        // One task uses up the first window and settles; the empty buffer
        // stops the ticker while the window is still open
        queue.add(timed(starts.clone()), TaskOptions::default()).await.await.unwrap();
        tokio::time::sleep_until(origin + Duration::from_millis(10)).await;

        let _b = queue.add(timed(starts.clone()), TaskOptions::default()).await;
        let _c = queue.add(timed(starts.clone()), TaskOptions::default()).await;
        assert_eq!(queue.size().await, 2);
        assert_eq!(queue.phase().await, QueuePhase::RateLimited);

        queue.on_idle().await;
        let starts = starts.lock().unwrap().clone();

        assert_eq!(starts.len(), 3);
        assert!(starts[0] < Duration::from_millis(10));
        assert!(starts[1] >= Duration::from_millis(100) && starts[1] < Duration::from_millis(110));
        assert!(starts[2] >= Duration::from_millis(200) && starts[2] < Duration::from_millis(210));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slot_is_released_before_handle_resolves() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(1),
            ..Default::default()
        })
        .unwrap();

        for i in 0..500u32 {
            let handle = queue.add(move || async move { Ok::<_, String>(i) }, TaskOptions::default()).await;
            assert_eq!(handle.await.unwrap(), i);
            assert_eq!(queue.pending().await, 0, "task {} still counted after its handle resolved", i);
            assert_eq!(queue.stats().await.total_settled(), u64::from(i) + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_carryover_counts_running_tasks() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            interval_cap: Some(1),
            interval_ms: 100,
            carryover_concurrency_count: true,
            ..Default::default()
        })
        .unwrap();

        let (slow_tx, slow) = gated();
        let _slow = queue.add(slow, TaskOptions::default()).await;
        let _next = queue.add(|| async { Ok::<_, String>(()) }, TaskOptions::default()).await;

        // The slow task is still running when the window rolls over, so it
        // fills the next window too
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(queue.size().await, 1);

        slow_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.size().await, 0);
        queue.on_idle().await;
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(1),
            ..Default::default()
        })
        .unwrap();

        let bad = queue.add(|| async { Err::<u32, _>("bad".to_string()) }, TaskOptions::default()).await;
        let good = queue.add(|| async { Ok::<u32, String>(7) }, TaskOptions::default()).await;

        assert_eq!(bad.await.unwrap_err().into_failure().as_deref(), Some("bad"));
        assert_eq!(good.await.unwrap(), 7);

        queue.on_idle().await;
        let stats = queue.stats().await;
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.total_succeeded, 1);
        assert_eq!(queue.pending().await, 0);
    }

    #[tokio::test]
    async fn test_panicking_task_frees_slot() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(1),
            ..Default::default()
        })
        .unwrap();

        let boom = queue
            .add(
                || async {
                    if true {
                        panic!("boom");
                    }
                    Ok::<u32, String>(0)
                },
                TaskOptions::default(),
            )
            .await;
        let after = queue.add(|| async { Ok::<u32, String>(1) }, TaskOptions::default()).await;

        assert!(matches!(boom.await, Err(TaskError::Panicked(_))));
        assert_eq!(after.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_queued_only() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            auto_start: false,
            ..Default::default()
        })
        .unwrap();
        let log: Log = Arc::default();

        let mut handles = Vec::new();
        for name in ["one", "two", "three"] {
            handles.push(queue.add(recorder(log.clone(), name), TaskOptions::default()).await);
        }

        queue.clear().await;
        assert_eq!(queue.size().await, 0);
        assert_eq!(queue.pending().await, 0);

        queue.start().await;
        settle().await;
        assert!(log.lock().unwrap().is_empty());

        for handle in handles {
            assert!(handle.await.unwrap_err().is_discarded());
        }
        assert_eq!(queue.stats().await.total_discarded, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_leaves_running_task() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(1),
            ..Default::default()
        })
        .unwrap();

        let (tx, work) = gated();
        let running = queue.add(work, TaskOptions::default()).await;
        let queued = queue.add(|| async { Ok::<_, String>(()) }, TaskOptions::default()).await;

        queue.clear().await;
        assert_eq!(queue.pending().await, 1);
        assert!(queued.await.unwrap_err().is_discarded());

        tx.send(()).unwrap();
        assert!(running.await.is_ok());
        queue.on_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_keep_submission_order() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(1),
            ..Default::default()
        })
        .unwrap();
        let log: Log = Arc::default();

        let (first_tx, first) = gated();
        let _first = queue.add(first, TaskOptions::default()).await;
        let _second = queue.add(recorder(log.clone(), "second"), TaskOptions::default()).await;
        let _third = queue.add(recorder(log.clone(), "third"), TaskOptions::default()).await;
        assert_eq!(queue.pending().await, 1);

        queue.pause().await;
        queue.pause().await;
        first_tx.send(()).unwrap();
        settle().await;

        assert_eq!(queue.pending().await, 0);
        assert_eq!(queue.size().await, 2);
        assert!(log.lock().unwrap().is_empty());

        queue.start().await;
        queue.on_idle().await;
        assert_eq!(*log.lock().unwrap(), vec!["second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_empty_and_on_idle() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(1),
            ..Default::default()
        })
        .unwrap();

        // Already idle
        queue.on_empty().await;
        queue.on_idle().await;

        let (tx_a, a) = gated();
        let (tx_b, b) = gated();
        let _a = queue.add(a, TaskOptions::default()).await;
        let _b = queue.add(b, TaskOptions::default()).await;

        let empty_waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.on_empty().await }
        });
        let idle_waiters: Vec<_> = (0..2)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.on_idle().await })
            })
            .collect();
        settle().await;

        tx_a.send(()).unwrap();
        settle().await;
        // b started, so nothing is queued but one task is still running
        assert!(empty_waiter.is_finished());
        assert!(idle_waiters.iter().all(|w| !w.is_finished()));

        tx_b.send(()).unwrap();
        for waiter in idle_waiters {
            waiter.await.unwrap();
        }

        // A second call after the drain resolves immediately
        queue.on_idle().await;
        assert_eq!(queue.phase().await, QueuePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_releases_empty_waiters() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            auto_start: false,
            ..Default::default()
        })
        .unwrap();
        let _h = queue.add(|| async { Ok::<_, String>(()) }, TaskOptions::default()).await;

        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.on_idle().await }
        });
        settle().await;
        assert!(!waiter.is_finished());

        queue.clear().await;
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_add_all_collects_in_order() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(2),
            ..Default::default()
        })
        .unwrap();

        let works: Vec<_> = (1..=4u32).map(|n| move || async move { Ok::<_, String>(n * 10) }).collect();
        let values = queue.add_all(works, TaskOptions::default()).await.unwrap();

        assert_eq!(values, vec![10, 20, 30, 40]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_all_first_failure_does_not_cancel_siblings() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig::default()).unwrap();
        let finished = Arc::new(StdMutex::new(0u32));

        let works: Vec<_> = (0..3u64)
            .map(|n| {
                let finished = Arc::clone(&finished);
                move || -> futures::future::BoxFuture<'static, Result<u64, String>> {
                    Box::pin(async move {
                        if n == 0 {
                            return Err("first".to_string());
                        }
                        tokio::time::sleep(Duration::from_millis(50 * n)).await;
                        *finished.lock().unwrap() += 1;
                        Ok(n)
                    })
                }
            })
            .collect();

        let result = queue.add_all(works, TaskOptions::default()).await;
        assert_eq!(result.unwrap_err().into_failure().as_deref(), Some("first"));

        queue.on_idle().await;
        assert_eq!(*finished.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_with_tracked_queue() {
        let queue: TrackedQueue = TrackedQueue::new(QueueConfig {
            concurrency: Some(1),
            ..Default::default()
        })
        .unwrap();
        let x = "x".to_string();

        assert!(!queue.is_inserted(&x).await);

        let (tx, work) = gated();
        let handle = queue.add(work, TaskOptions::new().with_id("x")).await;
        assert!(queue.is_inserted(&x).await);
        assert!(queue.is_processed(&x).await);

        let dup = queue
            .add_unique(|| async { Ok::<_, String>(()) }, TaskOptions::new().with_id("x"))
            .await;
        assert!(dup.is_none());

        let y = queue
            .add_unique(|| async { Ok::<_, String>(()) }, TaskOptions::new().with_id("y"))
            .await;
        assert!(y.is_some());
        assert!(queue.is_pending(&"y".to_string()).await);

        tx.send(()).unwrap();
        handle.await.unwrap();
        queue.on_idle().await;
        assert!(queue.is_inserted(&x).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_on_empty_queue_resets_identity_only() {
        let queue: TrackedQueue = TrackedQueue::new(QueueConfig::default()).unwrap();
        let id = "done".to_string();

        queue
            .add(|| async { Ok::<_, String>(()) }, TaskOptions::new().with_id("done"))
            .await
            .await
            .unwrap();
        queue.on_idle().await;
        assert!(queue.is_processed(&id).await);
        let before = queue.stats().await;

        queue.clear().await;

        assert!(!queue.is_inserted(&id).await);
        assert_eq!(queue.stats().await, before);
        assert_eq!(queue.phase().await, QueuePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_higher_priority_does_not_preempt_running() {
        let queue: TaskQueue = TaskQueue::new(QueueConfig {
            concurrency: Some(1),
            ..Default::default()
        })
        .unwrap();
        let log: Log = Arc::default();

        let (tx, slow) = gated();
        let _slow = queue.add(slow, TaskOptions::new().with_priority(-1)).await;
        let _bg = queue.add(recorder(log.clone(), "background"), TaskOptions::new().with_priority(-1)).await;
        let _urgent = queue.add(recorder(log.clone(), "refresh"), TaskOptions::new().with_priority(1)).await;

        assert_eq!(queue.pending().await, 1);
        tx.send(()).unwrap();
        queue.on_idle().await;

        assert_eq!(*log.lock().unwrap(), vec!["refresh", "background"]);
    }
}
