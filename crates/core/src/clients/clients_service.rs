use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use super::clients_model::{
    completeness_percent, is_filled, normalize_name, ClientSummary, ClientTier, ClientView,
    MergeConfig, MergedClientView,
};
use super::clients_traits::{ClientMergeServiceTrait, ClientSource};
use crate::errors::Result;

type EntityTable = HashMap<String, Arc<ClientView>>;

#[derive(Default)]
struct MergeCache {
    entries: EntityTable,
    fetched_at: Option<Instant>,
    /// Bumped on every invalidate so an in-flight refresh does not resurrect
    /// data that was invalidated while it was fetching.
    generation: u64,
}

/// Priority merge engine over the three client tiers.
///
/// Owns the self-reported entity cache. Registry views are supplied per call;
/// the self-reported tier is pulled through `source` and cached for
/// `config.cache_ttl`.
pub struct ClientMergeService {
    source: Arc<dyn ClientSource>,
    config: MergeConfig,
    cache: RwLock<MergeCache>,
    refresh_lock: AsyncMutex<()>,
}

impl ClientMergeService {
    pub fn new(source: Arc<dyn ClientSource>, config: MergeConfig) -> Self {
        Self {
            source,
            config,
            cache: RwLock::new(MergeCache::default()),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    /// Returns `Some(hit)` when the table is fresh, `None` when it must be refreshed.
    fn lookup_fresh(&self, key: &str) -> Option<Option<Arc<ClientView>>> {
        let cache = self.cache.read().unwrap();
        let fetched_at = cache.fetched_at?;
        if fetched_at.elapsed() >= self.config.cache_ttl {
            return None;
        }
        Some(cache.entries.get(key).cloned())
    }

    /// Pulls the full self-reported table. Newest view wins per name.
    async fn refresh(&self) -> Result<EntityTable> {
        let generation = self.cache.read().unwrap().generation;
        let views = self.source.fetch_all().await?;

        let mut entries = EntityTable::with_capacity(views.len());
        for view in views {
            entries.entry(view.key()).or_insert_with(|| Arc::new(view));
        }

        let mut cache = self.cache.write().unwrap();
        if cache.generation == generation {
            cache.entries = entries.clone();
            cache.fetched_at = Some(Instant::now());
            debug!("Refreshed self-reported cache with {} entities", entries.len());
        } else {
            debug!("Cache invalidated during refresh; result not stored");
        }
        Ok(entries)
    }

    fn overlay_registry(merged: &mut MergedClientView, registry: &ClientView) {
        for (field, value) in &registry.fields {
            if is_filled(value) {
                merged.fields.insert(field.clone(), value.clone());
            }
        }
        merged.data_source = ClientTier::Registry;
    }

    fn overlay_self_reported(merged: &mut MergedClientView, reported: &ClientView) {
        merged.name = reported.name.clone();
        for (field, value) in &reported.fields {
            if !value.is_null() {
                merged.fields.insert(field.clone(), value.clone());
            }
        }
        merged.data_source = ClientTier::SelfReported;
        merged.has_highest_tier_data = true;
        merged.tier_date = reported.created_at;
    }
}

#[async_trait]
impl ClientMergeServiceTrait for ClientMergeService {
    async fn get_entity_by_name(&self, name: &str) -> Option<Arc<ClientView>> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }
        if let Some(hit) = self.lookup_fresh(&key) {
            return hit;
        }

        // Single-flight: late callers wait here and find a fresh table.
        let _guard = self.refresh_lock.lock().await;
        if let Some(hit) = self.lookup_fresh(&key) {
            return hit;
        }

        match self.refresh().await {
            Ok(entries) => entries.get(&key).cloned(),
            Err(e) => {
                warn!("Self-reported tier unavailable, merging without it: {}", e);
                None
            }
        }
    }

    async fn merge_one(&self, reported: &ClientView, registry: &[ClientView]) -> MergedClientView {
        let key = reported.key();
        if key.is_empty() {
            return MergedClientView::passthrough(reported);
        }

        let mut merged = MergedClientView {
            name: reported.name.clone(),
            fields: reported.fields.clone(),
            data_source: ClientTier::ReportedByOther,
            has_highest_tier_data: false,
            tier_date: None,
            completeness_percent: 0,
        };

        if let Some(master) = registry.iter().find(|candidate| candidate.key() == key) {
            Self::overlay_registry(&mut merged, master);
        }

        if let Some(self_reported) = self.get_entity_by_name(&key).await {
            Self::overlay_self_reported(&mut merged, &self_reported);
        }

        merged.completeness_percent = completeness_percent(&merged.name, &merged.fields);
        merged
    }

    async fn merge_many(
        &self,
        reported: &[ClientView],
        registry: &[ClientView],
    ) -> Vec<MergedClientView> {
        let merges = reported.iter().map(|view| async move {
            match AssertUnwindSafe(self.merge_one(view, registry))
                .catch_unwind()
                .await
            {
                Ok(merged) => merged,
                Err(_) => {
                    error!("Merge panicked for client '{}'; using unmerged view", view.name);
                    MergedClientView::passthrough(view)
                }
            }
        });
        join_all(merges).await
    }

    async fn get_summary(&self, name: &str) -> Option<ClientSummary> {
        if name.trim().is_empty() {
            return None;
        }
        let entity = self.get_entity_by_name(name).await;

        Some(match entity {
            Some(view) => ClientSummary {
                client_name: name.to_string(),
                has_highest_tier_data: true,
                tier_date: view.created_at,
                submission_status: view.field_str("submissionStatus"),
                assigned_team: view.field_str("assignedTeam"),
                completeness_percent: view.completeness_percent(),
                data_source: ClientTier::SelfReported,
            },
            None => ClientSummary {
                client_name: name.to_string(),
                has_highest_tier_data: false,
                tier_date: None,
                submission_status: None,
                assigned_team: None,
                completeness_percent: 0,
                data_source: ClientTier::ReportedByOther,
            },
        })
    }

    fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap();
        cache.entries.clear();
        cache.fetched_at = None;
        cache.generation = cache.generation.wrapping_add(1);
        debug!("Client merge cache invalidated");
    }

    async fn warm_cache(&self) -> bool {
        let _guard = self.refresh_lock.lock().await;
        match self.refresh().await {
            Ok(entries) => {
                info!("Client merge cache warmed with {} entities", entries.len());
                true
            }
            Err(e) => {
                warn!("Failed to warm client merge cache: {}", e);
                false
            }
        }
    }

    fn dispose(&self) {
        self.invalidate();
        info!("Client merge service disposed");
    }
}
