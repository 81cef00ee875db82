use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, warn};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::scheduler_model::{CommitFn, SchedulerConfig, UpdatePriority};
use crate::errors::Error;

/// A debounced update waiting for its timer.
pub struct ScheduledUpdate<V> {
    pub key: String,
    pub value: V,
    pub priority: UpdatePriority,
    pub on_commit: CommitFn<V>,
    pub enqueued_at: Instant,
    /// Set on the single retry armed after a failed commit.
    pub is_retry: bool,
}

struct PendingEntry<V> {
    update: ScheduledUpdate<V>,
    generation: u64,
    timer: JoinHandle<()>,
}

/// Cancellation epoch a commit started under. A failed commit only arms its
/// retry while neither `clear` nor `cancel` for its key ran since.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch {
    cleared: u64,
    cancelled: u64,
}

struct SchedulerState<V> {
    pending: BTreeMap<String, PendingEntry<V>>,
    next_generation: u64,
    cleared: u64,
    cancelled: BTreeMap<String, u64>,
    disposed: bool,
}

impl<V> SchedulerState<V> {
    fn epoch_of(&self, key: &str) -> Epoch {
        Epoch {
            cleared: self.cleared,
            cancelled: self.cancelled.get(key).copied().unwrap_or(0),
        }
    }
}

struct SchedulerInner<V> {
    config: SchedulerConfig,
    state: Mutex<SchedulerState<V>>,
}

/// Per-key debounced write coalescing.
///
/// At most one update is pending per key. Scheduling a key again cancels the
/// previous timer and replaces its value, so only the latest value commits.
/// Timers run as tokio tasks; the scheduler must be used inside a runtime.
pub struct UpdateScheduler<V> {
    inner: Arc<SchedulerInner<V>>,
}

impl<V> Clone for UpdateScheduler<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> UpdateScheduler<V>
where
    V: Clone + Send + 'static,
{
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                state: Mutex::new(SchedulerState {
                    pending: BTreeMap::new(),
                    next_generation: 0,
                    cleared: 0,
                    cancelled: BTreeMap::new(),
                    disposed: false,
                }),
            }),
        }
    }

    /// Replaces any pending update for `key` and arms a timer for `priority`.
    pub fn schedule(
        &self,
        key: impl Into<String>,
        value: V,
        priority: UpdatePriority,
        on_commit: CommitFn<V>,
    ) {
        let key = key.into();
        let mut state = self.inner.state.lock().unwrap();
        if state.disposed {
            warn!("Ignoring update for '{}': scheduler disposed", key);
            return;
        }

        let delay = self.inner.config.delay_for(priority);
        let update = ScheduledUpdate {
            key,
            value,
            priority,
            on_commit,
            enqueued_at: Instant::now(),
            is_retry: false,
        };
        Self::arm(&self.inner, &mut state, update, delay);
    }

    /// Commits every pending update now, in key order. Returns how many fired.
    pub async fn flush_all(&self) -> usize {
        let drained: Vec<(ScheduledUpdate<V>, Epoch)> = {
            let mut state = self.inner.state.lock().unwrap();
            let pending = std::mem::take(&mut state.pending);
            pending
                .into_values()
                .map(|entry| {
                    entry.timer.abort();
                    let epoch = state.epoch_of(&entry.update.key);
                    (entry.update, epoch)
                })
                .collect()
        };

        let count = drained.len();
        if count > 0 {
            debug!("Flushing {} pending updates", count);
        }
        for (update, epoch) in drained {
            Self::commit(&self.inner, update, epoch).await;
        }
        count
    }

    /// Cancels every pending update without committing. Returns how many were dropped.
    ///
    /// Commits already running finish, but a failure no longer arms a retry.
    pub fn clear(&self) -> usize {
        self.cancel_all(false)
    }

    /// Flushes, then clears, then refuses further schedules.
    pub async fn dispose(&self) {
        self.flush_all().await;
        let dropped = self.cancel_all(true);
        if dropped > 0 {
            debug!("Dropped {} retries while disposing scheduler", dropped);
        }
    }

    /// Cancels the pending update for one key. Returns false when none was pending.
    ///
    /// A commit for `key` already running will not retry if it fails.
    pub fn cancel(&self, key: &str) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        *state.cancelled.entry(key.to_string()).or_insert(0) += 1;
        match state.pending.remove(key) {
            Some(entry) => {
                entry.timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().unwrap().pending.len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.state.lock().unwrap().pending.contains_key(key)
    }

    fn cancel_all(&self, dispose: bool) -> usize {
        let mut state = self.inner.state.lock().unwrap();
        if dispose {
            state.disposed = true;
        }
        state.cleared += 1;
        let pending = std::mem::take(&mut state.pending);
        for entry in pending.values() {
            entry.timer.abort();
        }
        pending.len()
    }

    fn arm(
        inner: &Arc<SchedulerInner<V>>,
        state: &mut SchedulerState<V>,
        update: ScheduledUpdate<V>,
        delay: Duration,
    ) {
        state.next_generation += 1;
        let generation = state.next_generation;
        let key = update.key.clone();

        let weak = Arc::downgrade(inner);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Self::fire(inner, timer_key, generation).await;
            }
        });

        let entry = PendingEntry {
            update,
            generation,
            timer,
        };
        if let Some(previous) = state.pending.insert(key.clone(), entry) {
            previous.timer.abort();
            debug!("Coalesced update for '{}'", key);
        }
    }

    async fn fire(inner: Arc<SchedulerInner<V>>, key: String, generation: u64) {
        let update = {
            let mut state = inner.state.lock().unwrap();
            let current = state.pending.get(&key).map(|entry| entry.generation);
            match current {
                Some(pending) if pending == generation => {
                    let epoch = state.epoch_of(&key);
                    state
                        .pending
                        .remove(&key)
                        .map(|entry| (entry.update, epoch))
                }
                // A newer schedule replaced this timer's entry.
                _ => None,
            }
        };

        if let Some((update, epoch)) = update {
            Self::commit(&inner, update, epoch).await;
        }
    }

    async fn commit(inner: &Arc<SchedulerInner<V>>, update: ScheduledUpdate<V>, epoch: Epoch) {
        let outcome = AssertUnwindSafe((update.on_commit)(update.value.clone()))
            .catch_unwind()
            .await;

        let err = match outcome {
            Ok(Ok(())) => {
                debug!("Committed update for '{}'", update.key);
                return;
            }
            Ok(Err(e)) => e,
            Err(_) => Error::Commit(format!("commit for '{}' panicked", update.key)),
        };

        if update.is_retry {
            error!(
                "Retry for '{}' failed, dropping update: {}",
                update.key, err
            );
            return;
        }

        let mut state = inner.state.lock().unwrap();
        if state.disposed {
            warn!("Commit for '{}' failed after dispose: {}", update.key, err);
            return;
        }
        if state.epoch_of(&update.key) != epoch {
            debug!(
                "Commit for '{}' failed after it was cancelled, not retrying: {}",
                update.key, err
            );
            return;
        }
        if state.pending.contains_key(&update.key) {
            warn!(
                "Commit for '{}' failed; a newer update is already pending: {}",
                update.key, err
            );
            return;
        }

        warn!(
            "Commit for '{}' failed, retrying at slow tier: {}",
            update.key, err
        );
        let retry = ScheduledUpdate {
            priority: UpdatePriority::Slow,
            enqueued_at: Instant::now(),
            is_retry: true,
            ..update
        };
        Self::arm(inner, &mut state, retry, inner.config.retry_window());
    }
}
