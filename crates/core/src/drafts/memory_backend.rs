use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::drafts_traits::DraftBackend;
use crate::errors::Result;

/// Process-lifetime draft backend. Also the fallback when the configured
/// backend fails its startup probe.
#[derive(Default)]
pub struct MemoryDraftBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryDraftBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DraftBackend for MemoryDraftBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
