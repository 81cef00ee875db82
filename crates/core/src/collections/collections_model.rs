//! Record collection domain models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Collection holding forms filled directly by the client.
pub const SELF_REPORTED_COLLECTION: &str = "client_onboarding";
/// Collection holding the curated master client records.
pub const REGISTRY_COLLECTION: &str = "clients";
/// Collection holding client data reported by employees.
pub const REPORTED_BY_OTHER_COLLECTION: &str = "submissions";

/// A single row of a remote collection.
///
/// `values` holds the row's columns as they were written; `id` and the
/// timestamps are owned by the collection and never appear in `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub values: Map<String, Value>,
}

impl Record {
    /// Returns the value of a column, treating `created_at`/`updated_at`/`id`
    /// as virtual columns so they can be filtered and ordered on.
    pub fn column(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::String(self.id.clone())),
            "created_at" => Some(Value::String(timestamp_column(&self.created_at))),
            "updated_at" => Some(Value::String(timestamp_column(&self.updated_at))),
            other => self.values.get(other).cloned(),
        }
    }

    /// Returns true when every equality filter matches this record.
    pub fn matches(&self, filters: &[(String, Value)]) -> bool {
        filters
            .iter()
            .all(|(column, expected)| self.column(column).as_ref() == Some(expected))
    }
}

/// Fixed-width RFC 3339 rendering so timestamps order lexicographically.
pub fn timestamp_column(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Ordering clause for a select.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Filtered and ordered select over one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Equality filters, all of which must match.
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Applies filters, ordering and limit to an in-memory row set.
    ///
    /// Shared by collection implementations that cannot push the query down
    /// to their storage engine.
    pub fn apply(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut selected: Vec<Record> = records
            .into_iter()
            .filter(|record| record.matches(&self.filters))
            .collect();

        if let Some(order) = &self.order_by {
            selected.sort_by(|a, b| {
                let ordering = compare_values(a.column(&order.column), b.column(&order.column));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

fn compare_values(a: Option<Value>, b: Option<Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(&y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Kind of row change announced by a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// Change notification emitted after a successful collection write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordChange {
    pub collection: String,
    pub kind: ChangeKind,
    pub record_id: String,
}
