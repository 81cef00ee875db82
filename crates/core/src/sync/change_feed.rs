//! Collection change feed worker.
//!
//! Listens to row change notifications from the remote collections, debounces
//! bursts, then invalidates the merge cache (when self-reported data changed)
//! and tells dashboards to re-pull once per batch.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::sync_bus::SyncBus;
use super::sync_model::ChangeFeedConfig;
use crate::clients::ClientMergeServiceTrait;
use crate::collections::{RecordChange, RecordCollection, SELF_REPORTED_COLLECTION};

/// What the forwarders hand to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Change(RecordChange),
    /// The forwarder fell behind and dropped notifications for this collection.
    Lagged { collection: String, missed: u64 },
}

impl FeedEvent {
    pub fn collection(&self) -> &str {
        match self {
            FeedEvent::Change(change) => &change.collection,
            FeedEvent::Lagged { collection, .. } => collection,
        }
    }
}

pub struct ChangeFeedWorker {
    bus: SyncBus,
    merge: Arc<dyn ClientMergeServiceTrait>,
    config: ChangeFeedConfig,
}

impl ChangeFeedWorker {
    pub fn new(
        bus: SyncBus,
        merge: Arc<dyn ClientMergeServiceTrait>,
        config: ChangeFeedConfig,
    ) -> Self {
        Self { bus, merge, config }
    }

    /// Subscribes to every collection and runs the worker on a background task.
    ///
    /// The worker stops once every collection's change channel has closed.
    pub fn spawn(self, collections: &[Arc<dyn RecordCollection>]) -> JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        for collection in collections {
            forward_changes(
                collection.name().to_string(),
                collection.subscribe_changes(),
                tx.clone(),
            );
        }
        drop(tx);
        tokio::spawn(self.run(rx))
    }

    /// Debounce loop: collects events until the window passes quietly, then
    /// processes the batch. A batch never stays open longer than
    /// `max_batch_window`, so a steady stream still refreshes.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<FeedEvent>) {
        info!("Change feed worker started");
        let mut pending: Vec<FeedEvent> = Vec::new();
        let mut batch_deadline = Instant::now();

        loop {
            if pending.is_empty() {
                match rx.recv().await {
                    Some(event) => {
                        pending.push(event);
                        batch_deadline = Instant::now() + self.config.max_batch_window;
                    }
                    None => break,
                }
                continue;
            }

            let quiet_deadline = Instant::now() + self.config.debounce;
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => pending.push(event),
                        None => {
                            self.process_batch(&std::mem::take(&mut pending));
                            break;
                        }
                    }
                }
                _ = sleep_until(quiet_deadline.min(batch_deadline)) => {
                    self.process_batch(&std::mem::take(&mut pending));
                }
            }
        }

        info!("Change feed worker shutting down");
    }

    fn process_batch(&self, events: &[FeedEvent]) {
        if events.is_empty() {
            return;
        }
        debug!("Processing {} collection change(s)", events.len());

        if events
            .iter()
            .any(|event| event.collection() == SELF_REPORTED_COLLECTION)
        {
            self.merge.invalidate();
        }
        self.bus.force_refresh();
    }
}

/// Pipes one collection's broadcast changes into the worker channel.
pub fn forward_changes(
    collection: String,
    mut changes: broadcast::Receiver<RecordChange>,
    tx: mpsc::UnboundedSender<FeedEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match changes.recv().await {
                Ok(change) => FeedEvent::Change(change),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        "Change feed for '{}' lagged, {} notifications missed",
                        collection, missed
                    );
                    FeedEvent::Lagged {
                        collection: collection.clone(),
                        missed,
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if tx.send(event).is_err() {
                break;
            }
        }
        debug!("Change forwarder for '{}' stopped", collection);
    })
}
