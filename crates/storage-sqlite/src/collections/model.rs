//! Database model for collection rows.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::{Map, Value};

use crate::errors::StorageError;
use opsdesk_core::collections::{timestamp_column, Record};

/// One collection row; `data` holds the row's columns as a JSON object.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::collection_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordDB {
    pub collection: String,
    pub id: String,
    pub data: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RecordDB {
    pub fn from_record(collection: &str, record: &Record) -> Result<Self, StorageError> {
        Ok(Self {
            collection: collection.to_string(),
            id: record.id.clone(),
            data: serde_json::to_string(&record.values)?,
            created_at: timestamp_column(&record.created_at),
            updated_at: timestamp_column(&record.updated_at),
        })
    }

    pub fn into_record(self) -> Result<Record, StorageError> {
        let values: Map<String, Value> = serde_json::from_str(&self.data)?;
        Ok(Record {
            id: self.id,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            values,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
