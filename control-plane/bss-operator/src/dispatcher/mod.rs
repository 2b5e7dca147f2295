//! Keyed work dispatch: a deduplicating queue drained by a fixed worker pool.

mod backoff;
mod queue;

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use backoff::{Backoff, BackoffPolicy};
pub use queue::WorkQueue;

/// What a successful pass asks of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Nothing to do until the entity or one of its children changes.
    AwaitChange,
    Immediate,
    After(Duration),
}

/// How a failed pass should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Permanent for the current spec; no timer-driven retry.
    AwaitChange,
    After(Duration),
    /// Per-key exponential backoff.
    Backoff,
}

pub trait Retryable {
    fn retry(&self) -> Retry;
}

pub struct Dispatcher<K> {
    name: &'static str,
    queue: WorkQueue<K>,
    workers: usize,
}

impl<K> Dispatcher<K>
where
    K: Hash + Eq + Clone + Send + Sync + Display + 'static,
{
    pub fn new(name: &'static str, queue: WorkQueue<K>, workers: usize) -> Self {
        Self {
            name,
            queue,
            workers: workers.max(1),
        }
    }

    pub fn queue(&self) -> &WorkQueue<K> {
        &self.queue
    }

    /// Drain the queue with `workers` concurrent tasks until `shutdown` fires.
    /// In-flight passes are allowed to finish.
    pub async fn run<R, Fut, E>(self, reconcile: R, shutdown: CancellationToken)
    where
        R: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Requeue, E>> + Send + 'static,
        E: Retryable + Display + Send + 'static,
    {
        let reconcile = Arc::new(reconcile);
        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let queue = self.queue.clone();
            let reconcile = reconcile.clone();
            let name = self.name;
            workers.spawn(async move {
                while let Some(key) = queue.next().await {
                    let outcome = reconcile(key.clone()).await;
                    handle_outcome(name, &queue, &key, outcome);
                    queue.done(&key);
                }
                debug!(controller = name, worker = id, "worker stopped");
            });
        }
        info!(controller = self.name, workers = self.workers, "dispatcher started");

        shutdown.cancelled().await;
        info!(controller = self.name, "dispatcher shutting down");
        self.queue.shutdown();
        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!(controller = self.name, error = %e, "worker task failed");
            }
        }
    }
}

/// Translate a pass result into queue scheduling.
pub(crate) fn handle_outcome<K, E>(
    name: &str,
    queue: &WorkQueue<K>,
    key: &K,
    outcome: Result<Requeue, E>,
) where
    K: Hash + Eq + Clone + Send + Sync + Display + 'static,
    E: Retryable + Display,
{
    match outcome {
        Ok(Requeue::AwaitChange) => queue.forget(key),
        Ok(Requeue::Immediate) => {
            queue.forget(key);
            queue.add(key.clone());
        }
        Ok(Requeue::After(delay)) => {
            queue.forget(key);
            queue.add_after(key.clone(), delay);
        }
        Err(err) => match err.retry() {
            Retry::AwaitChange => {
                warn!(controller = name, %key, error = %err, "reconcile failed; waiting for spec change");
                queue.forget(key);
            }
            Retry::After(delay) => {
                warn!(controller = name, %key, error = %err, retry_in = ?delay, "reconcile failed");
                queue.add_after(key.clone(), delay);
            }
            Retry::Backoff => {
                let delay = queue.add_rate_limited(key.clone());
                warn!(
                    controller = name,
                    %key,
                    error = %err,
                    retry_in = ?delay,
                    failures = queue.failures(key),
                    "reconcile failed; backing off"
                );
            }
        },
    }
}
