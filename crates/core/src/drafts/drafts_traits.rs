use async_trait::async_trait;

use crate::errors::Result;

/// Minimal string key/value persistence used by the draft store.
#[async_trait]
pub trait DraftBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Short backend name for logs.
    fn kind(&self) -> &'static str;
}
