use std::sync::Arc;

use log::debug;
use serde_json::Value;

use super::draft_store::DraftStore;
use crate::errors::Error;
use crate::scheduler::{commit_fn, CommitFn, SchedulerConfig, UpdatePriority, UpdateScheduler};

/// Routes form edits through the update scheduler into the draft store.
///
/// Field edits are debounced per draft key; an explicit save bypasses the
/// debounce and reports the outcome to the caller.
pub struct DraftAutosave {
    store: Arc<DraftStore>,
    scheduler: UpdateScheduler<Value>,
}

impl DraftAutosave {
    pub fn new(store: Arc<DraftStore>, config: SchedulerConfig) -> Self {
        Self {
            store,
            scheduler: UpdateScheduler::new(config),
        }
    }

    pub fn store(&self) -> &Arc<DraftStore> {
        &self.store
    }

    fn commit_for(&self, key: &str) -> CommitFn<Value> {
        let store = Arc::clone(&self.store);
        let key = key.to_string();
        commit_fn(move |payload: Value| {
            let store = Arc::clone(&store);
            let key = key.clone();
            async move {
                if store.save(&key, &payload).await {
                    Ok(())
                } else {
                    Err(Error::Commit(format!("draft '{}' was not persisted", key)))
                }
            }
        })
    }

    /// Debounced save of the latest form state.
    pub fn edit(&self, key: &str, payload: Value, priority: UpdatePriority) {
        self.scheduler
            .schedule(key, payload, priority, self.commit_for(key));
    }

    /// Saves immediately, superseding any pending edit for the key.
    pub async fn save_now(&self, key: &str, payload: &Value) -> bool {
        self.scheduler.cancel(key);
        self.store.save(key, payload).await
    }

    /// Drops the pending edit and the stored draft.
    pub async fn discard(&self, key: &str) {
        if self.scheduler.cancel(key) {
            debug!("Cancelled pending edit for draft '{}'", key);
        }
        self.store.clear(key).await;
    }

    pub async fn load(&self, key: &str) -> Option<Value> {
        self.store.load(key).await
    }

    pub async fn flush(&self) -> usize {
        self.scheduler.flush_all().await
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.scheduler.is_pending(key)
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Flushes outstanding edits, then stops accepting new ones.
    pub async fn dispose(&self) {
        self.scheduler.dispose().await;
    }
}
