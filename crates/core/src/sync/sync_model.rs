use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;

/// Reserved topic telling subscribers to re-pull regardless of local cache state.
pub const FORCE_REFRESH_TOPIC: &str = "force_refresh";
/// Suffix appended to an operation type for its retry-exhausted notification.
pub const ERROR_TOPIC_SUFFIX: &str = "_error";

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_STREAM_CAPACITY: usize = 256;
pub const DEFAULT_CHANGE_DEBOUNCE: Duration = Duration::from_millis(500);
/// Longest a batch may stay open while changes keep arriving.
pub const DEFAULT_CHANGE_MAX_BATCH_WINDOW: Duration = Duration::from_millis(2000);

/// Topic of the notification emitted when `operation_type` exhausts its retries.
pub fn error_topic(operation_type: &str) -> String {
    format!("{}{}", operation_type, ERROR_TOPIC_SUFFIX)
}

/// Metadata attached to every bus notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    pub final_attempt: bool,
    pub timestamp: DateTime<Utc>,
}

impl NotifyMetadata {
    pub fn now() -> Self {
        Self {
            operation: None,
            operation_id: None,
            attempt: None,
            final_attempt: false,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn for_operation(operation: &SyncOperation, final_attempt: bool) -> Self {
        Self {
            operation: Some(operation.operation_type.clone()),
            operation_id: Some(operation.id.clone()),
            attempt: Some(operation.attempt),
            final_attempt,
            timestamp: Utc::now(),
        }
    }
}

impl Default for NotifyMetadata {
    fn default() -> Self {
        Self::now()
    }
}

/// A notification as delivered to handlers and the broadcast stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncNotification {
    pub topic: String,
    pub payload: Value,
    pub metadata: NotifyMetadata,
}

/// Topic handler. Errors and panics are logged and isolated per handler.
pub type SyncHandler = Arc<dyn Fn(&SyncNotification) -> Result<()> + Send + Sync>;

/// Async write executed for a queued operation.
pub type OperationCommit = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wraps an async closure as an `OperationCommit`.
pub fn operation_commit<F, Fut>(f: F) -> OperationCommit
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |payload| f(payload).boxed())
}

/// Handle returned by `subscribe`, identifying exactly one registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    pub(crate) topic: String,
    pub(crate) id: u64,
}

impl SubscriptionToken {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Caller-side description of an operation to enqueue.
#[derive(Clone)]
pub struct SyncOperationRequest {
    pub operation_type: String,
    pub payload: Value,
    /// `None` succeeds immediately, which turns the operation into an ordered notification.
    pub commit: Option<OperationCommit>,
    /// Total attempts; falls back to the bus default.
    pub retries: Option<u32>,
}

impl SyncOperationRequest {
    pub fn new(operation_type: impl Into<String>, payload: Value) -> Self {
        Self {
            operation_type: operation_type.into(),
            payload,
            commit: None,
            retries: None,
        }
    }

    pub fn with_commit(mut self, commit: OperationCommit) -> Self {
        self.commit = Some(commit);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

impl fmt::Debug for SyncOperationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOperationRequest")
            .field("operation_type", &self.operation_type)
            .field("payload", &self.payload)
            .field("has_commit", &self.commit.is_some())
            .field("retries", &self.retries)
            .finish()
    }
}

/// Lifecycle of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationState {
    Queued,
    Executing,
    RetryWait,
    Succeeded,
    FailedFinal,
}

impl SyncOperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncOperationState::Succeeded | SyncOperationState::FailedFinal)
    }
}

/// An operation owned by the bus queue.
pub struct SyncOperation {
    pub id: String,
    pub operation_type: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    /// 1-based number of the attempt in progress; 0 while queued.
    pub attempt: u32,
    pub retries: u32,
    pub state: SyncOperationState,
    pub(crate) commit: Option<OperationCommit>,
}

impl fmt::Debug for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOperation")
            .field("id", &self.id)
            .field("operation_type", &self.operation_type)
            .field("attempt", &self.attempt)
            .field("retries", &self.retries)
            .field("state", &self.state)
            .finish()
    }
}

/// Counters exposed for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBusStats {
    pub queued: usize,
    pub draining: bool,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone)]
pub struct SyncBusConfig {
    pub default_retries: u32,
    /// Attempt `n` waits `retry_base_delay * n` before the next one.
    pub retry_base_delay: Duration,
    pub stream_capacity: usize,
}

impl Default for SyncBusConfig {
    fn default() -> Self {
        Self {
            default_retries: DEFAULT_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeFeedConfig {
    /// Quiet period that closes a batch.
    pub debounce: Duration,
    /// Hard cap measured from the first change of a batch.
    pub max_batch_window: Duration,
}

impl Default for ChangeFeedConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_CHANGE_DEBOUNCE,
            max_batch_window: DEFAULT_CHANGE_MAX_BATCH_WINDOW,
        }
    }
}
