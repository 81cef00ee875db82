//! Database model for persisted drafts.

use diesel::prelude::*;

/// One serialized draft envelope keyed by its draft key.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::drafts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DraftDB {
    pub draft_key: String,
    pub draft_value: String,
    pub updated_at: String,
}
