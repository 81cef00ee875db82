use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use diesel::prelude::*;
use log::debug;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::model::RecordDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::{IntoCore, StorageError};
use crate::schema::collection_records;
use opsdesk_core::collections::{
    timestamp_column, ChangeKind, Record, RecordChange, RecordCollection, RecordQuery,
};
use opsdesk_core::errors::{DatabaseError, Result};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A named collection stored as JSON rows in `collection_records`.
///
/// Only the collection name is pushed down to SQL; column filters and
/// ordering over the JSON payload are evaluated with `RecordQuery::apply`.
pub struct SqliteCollection {
    name: String,
    pool: Arc<DbPool>,
    writer: WriteHandle,
    changes: broadcast::Sender<RecordChange>,
}

impl SqliteCollection {
    pub fn new(name: impl Into<String>, pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        SqliteCollection {
            name: name.into(),
            pool,
            writer,
            changes,
        }
    }

    fn announce(&self, kind: ChangeKind, record_id: &str) {
        let _ = self.changes.send(RecordChange {
            collection: self.name.clone(),
            kind,
            record_id: record_id.to_string(),
        });
    }

    fn not_found(&self, id: &str) -> DatabaseError {
        DatabaseError::NotFound(format!("{}/{}", self.name, id))
    }
}

#[async_trait]
impl RecordCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn select(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = collection_records::table
            .filter(collection_records::collection.eq(&self.name))
            .select(RecordDB::as_select())
            .load::<RecordDB>(&mut conn)
            .into_core()?;

        let records = rows
            .into_iter()
            .map(RecordDB::into_record)
            .collect::<std::result::Result<Vec<_>, StorageError>>()?;
        Ok(query.apply(records))
    }

    async fn insert(&self, values: Map<String, Value>) -> Result<Record> {
        let now = Utc::now().trunc_subsecs(6);
        let record = Record {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            values,
        };
        let row = RecordDB::from_record(&self.name, &record)?;

        self.writer
            .exec(move |conn| {
                diesel::insert_into(collection_records::table)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await?;

        debug!("Inserted {}/{}", self.name, record.id);
        self.announce(ChangeKind::Inserted, &record.id);
        Ok(record)
    }

    async fn update(&self, id: &str, values: Map<String, Value>) -> Result<Record> {
        let collection = self.name.clone();
        let record_id = id.to_string();
        let missing = self.not_found(id);

        let updated = self
            .writer
            .exec(move |conn| {
                let existing = collection_records::table
                    .filter(collection_records::collection.eq(&collection))
                    .filter(collection_records::id.eq(&record_id))
                    .select(RecordDB::as_select())
                    .first::<RecordDB>(conn)
                    .optional()
                    .into_core()?
                    .ok_or(missing)?;

                let mut record = existing.into_record()?;
                record.values.extend(values);
                record.updated_at = Utc::now().trunc_subsecs(6);
                let data = serde_json::to_string(&record.values)?;

                diesel::update(
                    collection_records::table
                        .filter(collection_records::collection.eq(&collection))
                        .filter(collection_records::id.eq(&record_id)),
                )
                .set((
                    collection_records::data.eq(data),
                    collection_records::updated_at.eq(timestamp_column(&record.updated_at)),
                ))
                .execute(conn)
                .into_core()?;
                Ok(record)
            })
            .await?;

        self.announce(ChangeKind::Updated, id);
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let collection = self.name.clone();
        let record_id = id.to_string();
        let missing = self.not_found(id);

        self.writer
            .exec(move |conn| {
                let deleted = diesel::delete(
                    collection_records::table
                        .filter(collection_records::collection.eq(&collection))
                        .filter(collection_records::id.eq(&record_id)),
                )
                .execute(conn)
                .into_core()?;
                if deleted == 0 {
                    return Err(missing.into());
                }
                Ok(())
            })
            .await?;

        self.announce(ChangeKind::Deleted, id);
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }
}
