use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

use super::backoff::{Backoff, BackoffPolicy};

/// Deduplicating work queue.
///
/// A key sits in the queue at most once. Re-adding a key that is being
/// processed marks it dirty; `done` then puts it back exactly once, so any
/// number of signals during a pass collapse into a single re-delivery and a
/// key is never handed to two workers at the same time.
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

struct Inner<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    // earliest pending delayed add per key
    scheduled: HashMap<K, Instant>,
    backoff: Backoff<K>,
    shutting_down: bool,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Hash + Eq + Clone + Send + Sync + std::fmt::Display + 'static,
{
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    scheduled: HashMap::new(),
                    backoff: Backoff::new(policy),
                    shutting_down: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, key: K) {
        let mut st = self.lock();
        if st.shutting_down || st.dirty.contains(&key) {
            return;
        }
        st.dirty.insert(key.clone());
        if st.processing.contains(&key) {
            trace!(%key, "queue: key in flight; marked dirty");
            return;
        }
        st.queue.push_back(key);
        drop(st);
        self.inner.notify.notify_one();
    }

    /// Add `key` once `delay` has elapsed. Only the earliest pending deadline
    /// per key is kept.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let deadline = Instant::now() + delay;
        {
            let mut st = self.lock();
            if st.shutting_down {
                return;
            }
            if st.scheduled.get(&key).is_some_and(|d| *d <= deadline) {
                return;
            }
            st.scheduled.insert(key.clone(), deadline);
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let fire = {
                let mut st = queue.lock();
                if st.scheduled.get(&key) == Some(&deadline) {
                    st.scheduled.remove(&key);
                    true
                } else {
                    false
                }
            };
            if fire {
                queue.add(key);
            }
        });
    }

    /// Record a failure for `key` and schedule it after its backoff delay.
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let delay = self.lock().backoff.next_delay(&key);
        self.add_after(key, delay);
        delay
    }

    pub fn forget(&self, key: &K) {
        self.lock().backoff.forget(key);
    }

    pub fn failures(&self, key: &K) -> u32 {
        self.lock().backoff.failures(key)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn next(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.lock();
                if st.shutting_down {
                    return None;
                }
                if let Some(key) = st.queue.pop_front() {
                    st.dirty.remove(&key);
                    st.processing.insert(key.clone());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Mark the pass for `key` finished, re-queueing it if it went dirty.
    pub fn done(&self, key: &K) {
        let mut st = self.lock();
        st.processing.remove(key);
        if st.dirty.contains(key) && !st.shutting_down {
            st.queue.push_back(key.clone());
            drop(st);
            self.inner.notify.notify_one();
        }
    }

    pub fn shutdown(&self) {
        {
            let mut st = self.lock();
            st.shutting_down = true;
            st.queue.clear();
            st.scheduled.clear();
        }
        self.inner.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self, key: &K) -> bool {
        self.lock().processing.contains(key)
    }

    pub fn has_scheduled(&self, key: &K) -> bool {
        self.lock().scheduled.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new(BackoffPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(8),
        ))
    }

    #[tokio::test]
    async fn duplicate_adds_collapse() {
        let q = queue();
        q.add("ns/a".to_string());
        q.add("ns/a".to_string());
        q.add("ns/b".to_string());
        assert_eq!(q.len(), 2);
        assert_eq!(q.next().await.as_deref(), Some("ns/a"));
        assert_eq!(q.next().await.as_deref(), Some("ns/b"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn adds_during_processing_redeliver_once_after_done() {
        let q = queue();
        q.add("ns/a".to_string());
        let key = q.next().await.unwrap();
        assert!(q.is_processing(&key));
        for _ in 0..10 {
            q.add("ns/a".to_string());
        }
        // Not handed out while in flight.
        assert!(q.is_empty());
        q.done(&key);
        assert_eq!(q.len(), 1);
        let again = q.next().await.unwrap();
        assert_eq!(again, key);
        q.done(&again);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn done_without_new_signal_does_not_requeue() {
        let q = queue();
        q.add("ns/a".to_string());
        let key = q.next().await.unwrap();
        q.done(&key);
        assert!(q.is_empty());
        assert!(!q.is_processing(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn add_after_keeps_earliest_deadline() {
        let q = queue();
        q.add_after("ns/a".to_string(), Duration::from_secs(10));
        q.add_after("ns/a".to_string(), Duration::from_secs(60));
        q.add_after("ns/a".to_string(), Duration::from_secs(5));
        assert!(q.has_scheduled(&"ns/a".to_string()));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(q.len(), 1);
        let key = q.next().await.unwrap();
        q.done(&key);

        // The superseded 10s timer must not fire a second delivery.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(q.is_empty());
        assert!(!q.has_scheduled(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_adds_back_off_exponentially() {
        let q = queue();
        let key = "ns/a".to_string();
        assert_eq!(q.add_rate_limited(key.clone()), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let k = q.next().await.unwrap();
        q.done(&k);
        assert_eq!(q.add_rate_limited(key.clone()), Duration::from_secs(2));
        assert_eq!(q.failures(&key), 2);
        q.forget(&key);
        assert_eq!(q.failures(&key), 0);
    }

    #[tokio::test]
    async fn shutdown_releases_waiting_workers() {
        let q = queue();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.next().await })
        };
        tokio::task::yield_now().await;
        q.shutdown();
        assert_eq!(waiter.await.unwrap(), None);
        q.add("ns/a".to_string());
        assert!(q.is_empty());
    }
}
