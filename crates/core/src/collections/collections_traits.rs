//! Record collection contract.
//!
//! A collection is one independently-writable remote table. The three client
//! origins are each served by a collection; storage-specific details live in
//! the concrete implementations.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::collections_model::{Record, RecordChange, RecordQuery};
use crate::errors::Result;

/// Trait defining the contract for a queryable, writable collection.
#[async_trait]
pub trait RecordCollection: Send + Sync {
    /// Stable collection name (e.g. `client_onboarding`).
    fn name(&self) -> &str;

    /// Filtered/ordered select.
    async fn select(&self, query: &RecordQuery) -> Result<Vec<Record>>;

    /// Inserts a new row with a generated id.
    async fn insert(&self, values: Map<String, Value>) -> Result<Record>;

    /// Updates the given columns of an existing row.
    ///
    /// Returns `DatabaseError::NotFound` when `id` does not exist.
    async fn update(&self, id: &str, values: Map<String, Value>) -> Result<Record>;

    /// Deletes a row by id.
    ///
    /// Returns `DatabaseError::NotFound` when `id` does not exist.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Subscribes to row change notifications.
    fn subscribe_changes(&self) -> broadcast::Receiver<RecordChange>;
}
