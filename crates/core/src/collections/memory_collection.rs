//! In-memory `RecordCollection` used by tests and the degraded server mode.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    RwLock,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::collections_model::{ChangeKind, Record, RecordChange, RecordQuery};
use super::collections_traits::RecordCollection;
use crate::errors::{DatabaseError, Error, Result};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Collection backed by a `Vec<Record>` behind a lock.
pub struct InMemoryCollection {
    name: String,
    rows: RwLock<Vec<Record>>,
    changes: broadcast::Sender<RecordChange>,
    unavailable: AtomicBool,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            rows: RwLock::new(Vec::new()),
            changes,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Seeds the collection with existing rows without emitting changes.
    pub fn with_records(self, records: Vec<Record>) -> Self {
        self.rows.write().unwrap().extend(records);
        self
    }

    /// Makes every subsequent call fail with a `Source` error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::source_unavailable(&self.name, "collection is offline"));
        }
        Ok(())
    }

    fn announce(&self, kind: ChangeKind, record_id: &str) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.changes.send(RecordChange {
            collection: self.name.clone(),
            kind,
            record_id: record_id.to_string(),
        });
    }
}

#[async_trait]
impl RecordCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn select(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        self.ensure_available()?;
        let rows = self.rows.read().unwrap().clone();
        Ok(query.apply(rows))
    }

    async fn insert(&self, values: Map<String, Value>) -> Result<Record> {
        self.ensure_available()?;
        let now = Utc::now();
        let record = Record {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            values,
        };
        self.rows.write().unwrap().push(record.clone());
        self.announce(ChangeKind::Inserted, &record.id);
        Ok(record)
    }

    async fn update(&self, id: &str, values: Map<String, Value>) -> Result<Record> {
        self.ensure_available()?;
        let updated = {
            let mut rows = self.rows.write().unwrap();
            let row = rows
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or_else(|| DatabaseError::NotFound(format!("{}/{}", self.name, id)))?;
            row.values.extend(values);
            row.updated_at = Utc::now();
            row.clone()
        };
        self.announce(ChangeKind::Updated, id);
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_available()?;
        {
            let mut rows = self.rows.write().unwrap();
            let before = rows.len();
            rows.retain(|row| row.id != id);
            if rows.len() == before {
                return Err(DatabaseError::NotFound(format!("{}/{}", self.name, id)).into());
            }
        }
        self.announce(ChangeKind::Deleted, id);
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }
}
