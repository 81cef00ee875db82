use std::collections::HashMap;
use std::sync::Arc;

use opsdesk_core::{
    clients::{
        ClientMergeService, ClientMergeServiceTrait, ClientTier, CollectionClientSource,
        MergeConfig,
    },
    collections::{
        RecordCollection, REGISTRY_COLLECTION, REPORTED_BY_OTHER_COLLECTION,
        SELF_REPORTED_COLLECTION,
    },
    drafts::{DraftAutosave, DraftStore, DraftStoreConfig},
    errors::{Result as CoreResult, ValidationError},
    scheduler::SchedulerConfig,
    sync::{ChangeFeedConfig, ChangeFeedWorker, SyncBus, SyncBusConfig},
};
use opsdesk_storage_sqlite::{
    db::{self, spawn_writer},
    SqliteCollection, SqliteDraftBackend,
};
use tokio::task::JoinHandle;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub merge_service: Arc<dyn ClientMergeServiceTrait>,
    pub collections: HashMap<String, Arc<dyn RecordCollection>>,
    pub sync_bus: SyncBus,
    pub autosave: Arc<DraftAutosave>,
    pub change_feed: JoinHandle<()>,
    pub db_path: String,
}

impl AppState {
    pub fn collection(&self, name: &str) -> CoreResult<Arc<dyn RecordCollection>> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownCollection(name.to_string()).into())
    }
}

pub fn init_tracing() {
    let log_format = std::env::var("OPSDESK_LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let db_path = db::init(&config.data_dir)?;
    tracing::info!("Database path in use: {}", db_path);
    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = spawn_writer(Arc::clone(&pool));

    let collections: HashMap<String, Arc<dyn RecordCollection>> = [
        SELF_REPORTED_COLLECTION,
        REGISTRY_COLLECTION,
        REPORTED_BY_OTHER_COLLECTION,
    ]
    .into_iter()
    .map(|name| {
        let collection: Arc<dyn RecordCollection> = Arc::new(SqliteCollection::new(
            name,
            Arc::clone(&pool),
            writer.clone(),
        ));
        (name.to_string(), collection)
    })
    .collect();

    let self_reported = Arc::clone(&collections[SELF_REPORTED_COLLECTION]);
    let source = Arc::new(CollectionClientSource::new(
        self_reported,
        ClientTier::SelfReported,
    ));
    let merge_service: Arc<dyn ClientMergeServiceTrait> = Arc::new(ClientMergeService::new(
        source,
        MergeConfig {
            cache_ttl: config.cache_ttl,
        },
    ));
    if !merge_service.warm_cache().await {
        tracing::warn!("Self-reported cache is cold; first lookups will fetch");
    }

    let sync_bus = SyncBus::new(SyncBusConfig {
        default_retries: config.sync_retries,
        ..SyncBusConfig::default()
    });

    let draft_backend = Arc::new(SqliteDraftBackend::new(Arc::clone(&pool), writer));
    let draft_store = Arc::new(DraftStore::new(draft_backend, DraftStoreConfig::default()).await);
    if draft_store.is_degraded() {
        tracing::warn!("Draft storage degraded to memory; drafts will not survive restarts");
    }
    let autosave = Arc::new(DraftAutosave::new(draft_store, SchedulerConfig::default()));

    let watched: Vec<Arc<dyn RecordCollection>> = collections.values().cloned().collect();
    let change_feed = ChangeFeedWorker::new(
        sync_bus.clone(),
        Arc::clone(&merge_service),
        ChangeFeedConfig::default(),
    )
    .spawn(&watched);

    Ok(Arc::new(AppState {
        merge_service,
        collections,
        sync_bus,
        autosave,
        change_feed,
        db_path,
    }))
}

/// Flushes pending draft edits, lets queued writes settle, then releases
/// every component.
pub async fn shutdown(state: &AppState) {
    tracing::info!("Shutting down");
    state.autosave.dispose().await;
    state.sync_bus.wait_idle().await;
    state.change_feed.abort();
    state.sync_bus.dispose();
    state.merge_service.dispose();
}
