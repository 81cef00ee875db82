use std::sync::Arc;

use async_trait::async_trait;
use log::warn;

use super::clients_model::{ClientTier, ClientView};
use super::clients_traits::ClientSource;
use crate::collections::{OrderBy, RecordCollection, RecordQuery};
use crate::errors::Result;

/// Adapts a `RecordCollection` into a `ClientSource` for one tier.
pub struct CollectionClientSource {
    collection: Arc<dyn RecordCollection>,
    tier: ClientTier,
}

impl CollectionClientSource {
    pub fn new(collection: Arc<dyn RecordCollection>, tier: ClientTier) -> Self {
        Self { collection, tier }
    }

    pub fn tier(&self) -> ClientTier {
        self.tier
    }
}

#[async_trait]
impl ClientSource for CollectionClientSource {
    async fn fetch_all(&self) -> Result<Vec<ClientView>> {
        let query = RecordQuery::new().order_by(OrderBy::desc("created_at"));
        let records = self.collection.select(&query).await?;

        let views = records
            .iter()
            .filter_map(|record| match ClientView::from_record(self.tier, record) {
                Ok(view) => Some(view),
                Err(e) => {
                    warn!(
                        "Skipping {} row {}: {}",
                        self.collection.name(),
                        record.id,
                        e
                    );
                    None
                }
            })
            .collect();
        Ok(views)
    }
}
