use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use super::sync_model::{
    error_topic, NotifyMetadata, SubscriptionToken, SyncBusConfig, SyncBusStats, SyncHandler,
    SyncNotification, SyncOperation, SyncOperationRequest, SyncOperationState,
    FORCE_REFRESH_TOPIC,
};
use crate::errors::{Error, Result};

#[derive(Default)]
struct QueueState {
    operations: VecDeque<SyncOperation>,
    draining: bool,
    succeeded: u64,
    failed: u64,
}

struct SyncBusInner {
    config: SyncBusConfig,
    handlers: Mutex<HashMap<String, BTreeMap<u64, SyncHandler>>>,
    next_handler_id: AtomicU64,
    queue: Mutex<QueueState>,
    idle: Notify,
    stream: broadcast::Sender<SyncNotification>,
}

/// Publish/subscribe bus with a retrying FIFO operation queue.
///
/// Operations drain one at a time on a background task; each runs to either
/// success (notifying its type) or retry exhaustion (notifying `<type>_error`).
/// Cloning is cheap and yields a handle to the same bus.
#[derive(Clone)]
pub struct SyncBus {
    inner: Arc<SyncBusInner>,
}

impl SyncBus {
    pub fn new(config: SyncBusConfig) -> Self {
        let (stream, _) = broadcast::channel(config.stream_capacity.max(1));
        Self {
            inner: Arc::new(SyncBusInner {
                config,
                handlers: Mutex::new(HashMap::new()),
                next_handler_id: AtomicU64::new(1),
                queue: Mutex::new(QueueState::default()),
                idle: Notify::new(),
                stream,
            }),
        }
    }

    /// Registers `handler` under `topic`.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> SubscriptionToken
    where
        F: Fn(&SyncNotification) -> Result<()> + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::SeqCst);
        let handler: SyncHandler = Arc::new(handler);
        self.inner
            .handlers
            .lock()
            .unwrap()
            .entry(topic.clone())
            .or_default()
            .insert(id, handler);
        debug!("Subscribed handler {} to '{}'", id, topic);
        SubscriptionToken { topic, id }
    }

    /// Removes exactly the registration behind `token`.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        let mut handlers = self.inner.handlers.lock().unwrap();
        let Some(topic_handlers) = handlers.get_mut(&token.topic) else {
            return false;
        };
        let removed = topic_handlers.remove(&token.id).is_some();
        if topic_handlers.is_empty() {
            handlers.remove(&token.topic);
        }
        removed
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.inner
            .handlers
            .lock()
            .unwrap()
            .get(topic)
            .map_or(0, BTreeMap::len)
    }

    /// Invokes every handler registered under `topic` at call time.
    ///
    /// Handlers run synchronously in registration order against a snapshot of
    /// the registry, so a handler may subscribe or unsubscribe freely.
    pub fn notify(&self, topic: &str, payload: Value, metadata: NotifyMetadata) {
        self.inner.notify(topic, payload, metadata);
    }

    /// Tells every `force_refresh` subscriber to re-pull its data.
    pub fn force_refresh(&self) {
        info!("Forcing dashboard refresh");
        self.notify(FORCE_REFRESH_TOPIC, Value::Null, NotifyMetadata::now());
    }

    /// Receives a copy of every notification, for streaming to remote dashboards.
    pub fn subscribe_stream(&self) -> broadcast::Receiver<SyncNotification> {
        self.inner.stream.subscribe()
    }

    /// Appends an operation to the queue and starts draining if idle.
    /// Returns the generated operation id.
    pub fn enqueue(&self, request: SyncOperationRequest) -> String {
        let operation = SyncOperation {
            id: Uuid::now_v7().to_string(),
            operation_type: request.operation_type,
            payload: request.payload,
            enqueued_at: Utc::now(),
            attempt: 0,
            retries: request
                .retries
                .unwrap_or(self.inner.config.default_retries)
                .max(1),
            state: SyncOperationState::Queued,
            commit: request.commit,
        };
        let id = operation.id.clone();

        let start_drain = {
            let mut queue = self.inner.queue.lock().unwrap();
            debug!(
                "Enqueued {} operation {} ({} ahead)",
                operation.operation_type,
                id,
                queue.operations.len()
            );
            queue.operations.push_back(operation);
            !std::mem::replace(&mut queue.draining, true)
        };

        if start_drain {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.drain().await });
        }
        id
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().unwrap().operations.len()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }

    pub fn stats(&self) -> SyncBusStats {
        let queue = self.inner.queue.lock().unwrap();
        SyncBusStats {
            queued: queue.operations.len(),
            draining: queue.draining,
            succeeded: queue.succeeded,
            failed: queue.failed,
        }
    }

    /// Resolves once the queue is empty and no operation is executing.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Drops every handler. Queued operations still run to a terminal state.
    pub fn dispose(&self) {
        let dropped: usize = {
            let mut handlers = self.inner.handlers.lock().unwrap();
            let count = handlers.values().map(BTreeMap::len).sum();
            handlers.clear();
            count
        };
        info!("Sync bus disposed, dropped {} handlers", dropped);
    }
}

impl SyncBusInner {
    fn is_idle(&self) -> bool {
        let queue = self.queue.lock().unwrap();
        queue.operations.is_empty() && !queue.draining
    }

    fn notify(&self, topic: &str, payload: Value, metadata: NotifyMetadata) {
        let snapshot: Vec<(u64, SyncHandler)> = self
            .handlers
            .lock()
            .unwrap()
            .get(topic)
            .map(|handlers| {
                handlers
                    .iter()
                    .map(|(id, handler)| (*id, Arc::clone(handler)))
                    .collect()
            })
            .unwrap_or_default();

        let notification = SyncNotification {
            topic: topic.to_string(),
            payload,
            metadata,
        };

        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(&notification))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Handler {} for '{}' failed: {}", id, topic, e),
                Err(_) => error!("Handler {} for '{}' panicked", id, topic),
            }
        }

        // No stream subscribers is normal.
        let _ = self.stream.send(notification);
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let next = {
                let mut queue = self.queue.lock().unwrap();
                match queue.operations.pop_front() {
                    Some(operation) => Some(operation),
                    None => {
                        queue.draining = false;
                        None
                    }
                }
            };

            let Some(operation) = next else {
                self.idle.notify_waiters();
                return;
            };

            let succeeded = self.execute(operation).await;
            {
                let mut queue = self.queue.lock().unwrap();
                if succeeded {
                    queue.succeeded += 1;
                } else {
                    queue.failed += 1;
                }
            }
        }
    }

    /// Runs one operation through its attempts. Returns true on success.
    async fn execute(&self, mut operation: SyncOperation) -> bool {
        loop {
            operation.attempt += 1;
            operation.state = SyncOperationState::Executing;

            let outcome = match operation.commit.clone() {
                None => Ok(()),
                Some(commit) => match AssertUnwindSafe(commit(operation.payload.clone()))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Commit(format!(
                        "{} operation {} panicked",
                        operation.operation_type, operation.id
                    ))),
                },
            };

            match outcome {
                Ok(()) => {
                    operation.state = SyncOperationState::Succeeded;
                    debug!(
                        "{} operation {} succeeded on attempt {}",
                        operation.operation_type, operation.id, operation.attempt
                    );
                    let metadata = NotifyMetadata::for_operation(&operation, false);
                    self.notify(
                        &operation.operation_type,
                        operation.payload.clone(),
                        metadata,
                    );
                    return true;
                }
                Err(e) if operation.attempt < operation.retries => {
                    operation.state = SyncOperationState::RetryWait;
                    let delay = self.config.retry_base_delay * operation.attempt;
                    warn!(
                        "{} operation {} failed on attempt {}/{}, retrying in {:?}: {}",
                        operation.operation_type,
                        operation.id,
                        operation.attempt,
                        operation.retries,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    operation.state = SyncOperationState::FailedFinal;
                    error!(
                        "{} operation {} failed after {} attempts: {}",
                        operation.operation_type, operation.id, operation.attempt, e
                    );
                    let metadata = NotifyMetadata::for_operation(&operation, true);
                    let payload = json!({
                        "error": e.to_string(),
                        "payload": operation.payload,
                    });
                    self.notify(&error_topic(&operation.operation_type), payload, metadata);
                    return false;
                }
            }
        }
    }
}
