use std::sync::Arc;

use async_trait::async_trait;

use super::clients_model::{ClientSummary, ClientView, MergedClientView};
use crate::errors::Result;

/// Bulk source for one tier of client views.
#[async_trait]
pub trait ClientSource: Send + Sync {
    /// Fetches every view of the tier, newest first.
    async fn fetch_all(&self) -> Result<Vec<ClientView>>;
}

/// Consumer contract of the priority merge engine.
#[async_trait]
pub trait ClientMergeServiceTrait: Send + Sync {
    /// Looks up the self-reported view for `name`, refreshing the cache when stale.
    async fn get_entity_by_name(&self, name: &str) -> Option<Arc<ClientView>>;

    /// Reconciles one reported view with the registry and self-reported tiers.
    async fn merge_one(&self, reported: &ClientView, registry: &[ClientView]) -> MergedClientView;

    /// Merges every view independently, preserving input order.
    async fn merge_many(
        &self,
        reported: &[ClientView],
        registry: &[ClientView],
    ) -> Vec<MergedClientView>;

    async fn get_summary(&self, name: &str) -> Option<ClientSummary>;

    /// Drops the cache; the next lookup performs a full refresh.
    fn invalidate(&self);

    /// Refreshes the cache eagerly. Returns false when the source failed.
    async fn warm_cache(&self) -> bool;

    fn dispose(&self);
}
