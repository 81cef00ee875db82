use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::drafts_constants::{
    DEFAULT_MAX_AGE, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY, DRAFT_VERSION,
    EMPLOYEE_FORM_PREFIX, SIGNIFICANT_SECTIONS,
};

/// Stored envelope around a draft payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub payload: Value,
    /// Unix epoch milliseconds of the save.
    pub timestamp: i64,
    pub version: String,
}

impl DraftSnapshot {
    pub fn new(payload: Value, version: &str) -> Self {
        Self {
            payload,
            timestamp: Utc::now().timestamp_millis(),
            version: version.to_string(),
        }
    }

    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis - self.timestamp
    }

    pub fn is_expired(&self, max_age: Duration, now_millis: i64) -> bool {
        self.age_millis(now_millis) > max_age.as_millis() as i64
    }
}

#[derive(Debug, Clone)]
pub struct DraftStoreConfig {
    /// Total write attempts per save, including the first.
    pub max_attempts: u32,
    /// Attempt `n` waits `retry_base_delay * n` before the next one.
    pub retry_base_delay: Duration,
    pub max_age: Duration,
    pub version: String,
}

impl Default for DraftStoreConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_age: DEFAULT_MAX_AGE,
            version: DRAFT_VERSION.to_string(),
        }
    }
}

/// Builds the draft key for an employee's monthly form.
///
/// Returns `None` when any part is blank.
pub fn draft_key(name: &str, phone: &str, month_key: &str) -> Option<String> {
    let name = name.trim();
    let phone = phone.trim();
    let month_key = month_key.trim();
    if name.is_empty() || phone.is_empty() || month_key.is_empty() {
        return None;
    }

    let name = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    Some(format!(
        "{}{}_{}_{}",
        EMPLOYEE_FORM_PREFIX, name, phone, month_key
    ))
}

/// True when any significant section of a form draft has content.
pub fn is_significant_draft(payload: &Value) -> bool {
    let Some(sections) = payload.as_object() else {
        return false;
    };
    SIGNIFICANT_SECTIONS
        .iter()
        .any(|section| match sections.get(*section) {
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(fields)) => !fields.is_empty(),
            _ => false,
        })
}
