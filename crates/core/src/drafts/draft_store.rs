use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use super::drafts_constants::PROBE_KEY;
use super::drafts_model::{DraftSnapshot, DraftStoreConfig};
use super::drafts_traits::DraftBackend;
use super::memory_backend::MemoryDraftBackend;
use crate::errors::Result;

/// Durable store for in-progress form edits.
///
/// Saves retry with linear backoff; loads evict snapshots older than
/// `config.max_age`. Backend errors never escape: callers see `false` or
/// `None` and the failure is logged.
///
/// Every save claims a new revision of its key, and a write only lands while
/// its claim is still the latest. A save that is retrying therefore stops as
/// soon as a newer save or a clear for the same key starts.
pub struct DraftStore {
    backend: Arc<dyn DraftBackend>,
    config: DraftStoreConfig,
    degraded: bool,
    revisions: Mutex<HashMap<String, u64>>,
}

impl DraftStore {
    /// Probes `backend` with a write and delete; falls back to memory when it fails.
    pub async fn new(backend: Arc<dyn DraftBackend>, config: DraftStoreConfig) -> Self {
        match Self::probe(backend.as_ref()).await {
            Ok(()) => {
                debug!("Draft store using {} backend", backend.kind());
                Self {
                    backend,
                    config,
                    degraded: false,
                    revisions: Mutex::new(HashMap::new()),
                }
            }
            Err(e) => {
                warn!(
                    "Draft backend '{}' unavailable, falling back to memory: {}",
                    backend.kind(),
                    e
                );
                Self {
                    backend: Arc::new(MemoryDraftBackend::new()),
                    config,
                    degraded: true,
                    revisions: Mutex::new(HashMap::new()),
                }
            }
        }
    }

    async fn probe(backend: &dyn DraftBackend) -> Result<()> {
        backend.set(PROBE_KEY, "test").await?;
        backend.remove(PROBE_KEY).await
    }

    /// True when the store fell back to memory at construction.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Wraps `payload` in a snapshot and writes it. Returns false once every
    /// attempt failed or when the payload cannot be serialized. A save
    /// superseded by a newer save or clear of `key` stops writing and
    /// returns true.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, payload: &T) -> bool {
        if key.trim().is_empty() {
            warn!("Refusing to save draft under an empty key");
            return false;
        }

        let encoded = match serde_json::to_value(payload)
            .map(|value| DraftSnapshot::new(value, &self.config.version))
            .and_then(|snapshot| serde_json::to_string(&snapshot))
        {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Draft '{}' is not serializable: {}", key, e);
                return false;
            }
        };

        let claim = self.claim(key).await;
        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let revisions = self.revisions.lock().await;
            if revisions.get(key) != Some(&claim) {
                debug!("Draft '{}' superseded before attempt {}", key, attempt);
                return true;
            }
            let written = self.backend.set(key, &encoded).await;
            drop(revisions);

            match written {
                Ok(()) => return true,
                Err(e) => {
                    warn!("Save attempt {} failed for draft '{}': {}", attempt, key, e);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_base_delay * attempt).await;
                    }
                }
            }
        }

        error!(
            "Giving up on draft '{}' after {} attempts",
            key, max_attempts
        );
        false
    }

    /// Returns the payload, or `None` when missing, unreadable, or stale.
    /// Stale snapshots are deleted.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let snapshot = self.load_snapshot(key).await?;
        match serde_json::from_value(snapshot.payload) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Draft '{}' does not match the requested shape: {}", key, e);
                None
            }
        }
    }

    /// Like `load`, but returns the whole envelope.
    pub async fn load_snapshot(&self, key: &str) -> Option<DraftSnapshot> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read draft '{}': {}", key, e);
                return None;
            }
        };

        let snapshot: DraftSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Discarding unreadable draft '{}': {}", key, e);
                return None;
            }
        };

        if snapshot.is_expired(self.config.max_age, Utc::now().timestamp_millis()) {
            debug!("Draft '{}' expired, evicting", key);
            self.clear(key).await;
            return None;
        }
        Some(snapshot)
    }

    /// Best-effort delete. Saves of `key` still in flight are abandoned.
    pub async fn clear(&self, key: &str) {
        let mut revisions = self.revisions.lock().await;
        *revisions.entry(key.to_string()).or_insert(0) += 1;
        if let Err(e) = self.backend.remove(key).await {
            warn!("Failed to clear draft '{}': {}", key, e);
        }
    }

    async fn claim(&self, key: &str) -> u64 {
        let mut revisions = self.revisions.lock().await;
        let revision = revisions.entry(key.to_string()).or_insert(0);
        *revision += 1;
        *revision
    }
}
