//! Submitted tasks and their handles

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::domain::Priority;
use crate::error::TaskError;

/// Per-submission options
#[derive(Debug, Clone)]
pub struct TaskOptions<K = String> {
    /// Higher values are started first
    pub priority: i32,

    /// Identity used for de-duplication by tracking buffers
    pub id: Option<K>,
}

impl<K> Default for TaskOptions<K> {
    fn default() -> Self {
        Self { priority: 0, id: None }
    }
}

impl<K> TaskOptions<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: impl Into<i32>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<K>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl<K> From<Priority> for TaskOptions<K> {
    fn from(priority: Priority) -> Self {
        Self::default().with_priority(priority)
    }
}

/// How a started task ended, as seen by the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Succeeded,
    Failed,
}

/// A finished task whose result has not reached its handle yet
///
/// The queue records the outcome first and only then delivers, so a caller
/// woken by its handle never sees the task still counted as running.
pub(crate) struct Settlement {
    pub(crate) outcome: Outcome,
    deliver: Box<dyn FnOnce() + Send>,
}

impl Settlement {
    /// Hand the result to the task's handle
    pub(crate) fn deliver(self) {
        (self.deliver)()
    }
}

/// Type-erased unit of work held in the buffer
///
/// Running it calls the caller's closure and awaits the result. Dropping it
/// unrun, or dropping its settlement undelivered, resolves the handle with
/// [`TaskError::Discarded`].
pub struct Runnable(Box<dyn FnOnce() -> BoxFuture<'static, Settlement> + Send>);

impl Runnable {
    pub(crate) fn run(self) -> BoxFuture<'static, Settlement> {
        (self.0)()
    }
}

impl std::fmt::Debug for Runnable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Runnable")
    }
}

/// Wrap a work closure into a runnable and the handle that observes it
pub(crate) fn package<F, Fut, T, E>(work: F) -> (Runnable, TaskHandle<T, E>)
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    let runnable = Runnable(Box::new(move || {
        async move {
            // The closure is called inside the catch so a panic on call is
            // reported the same way as one raised while polling.
            let result = match AssertUnwindSafe(async move { work().await }).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskError::Failed(e)),
                Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
            };
            let outcome = if result.is_ok() {
                Outcome::Succeeded
            } else {
                Outcome::Failed
            };
            Settlement {
                outcome,
                deliver: Box::new(move || {
                    // The caller may have dropped the handle
                    let _ = tx.send(result);
                }),
            }
        }
        .boxed()
    }));

    (runnable, TaskHandle { rx })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Future resolving to the outcome of one submitted task
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<T, E> {
    rx: oneshot::Receiver<Result<T, TaskError<E>>>,
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Discarded)),
            Poll::Pending => Poll::Pending,
        }
    }
}
