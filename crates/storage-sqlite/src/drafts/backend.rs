use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;

use super::model::DraftDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::drafts::dsl::*;
use opsdesk_core::drafts::DraftBackend;
use opsdesk_core::errors::Result;

/// Draft persistence in the local SQLite database.
pub struct SqliteDraftBackend {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteDraftBackend {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        SqliteDraftBackend { pool, writer }
    }
}

#[async_trait]
impl DraftBackend for SqliteDraftBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        drafts
            .filter(draft_key.eq(key))
            .select(draft_value)
            .first::<String>(&mut conn)
            .optional()
            .into_core()
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let row = DraftDB {
            draft_key: key.to_string(),
            draft_value: value.to_string(),
            updated_at: Utc::now().to_rfc3339(),
        };
        self.writer
            .exec(move |conn| {
                diesel::replace_into(drafts)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(drafts.filter(draft_key.eq(key)))
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}
