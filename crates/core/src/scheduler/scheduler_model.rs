use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ValidationError};

pub const IMMEDIATE_DELAY: Duration = Duration::from_millis(100);
pub const FAST_DELAY: Duration = Duration::from_millis(300);
pub const NORMAL_DELAY: Duration = Duration::from_millis(800);
pub const SLOW_DELAY: Duration = Duration::from_millis(1500);
/// Wait before a failed commit re-enters the pending table at the slow tier.
pub const RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Debounce tier of a scheduled update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePriority {
    Immediate,
    Fast,
    #[default]
    Normal,
    Slow,
}

impl UpdatePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdatePriority::Immediate => "immediate",
            UpdatePriority::Fast => "fast",
            UpdatePriority::Normal => "normal",
            UpdatePriority::Slow => "slow",
        }
    }
}

impl fmt::Display for UpdatePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdatePriority {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(UpdatePriority::Immediate),
            "fast" => Ok(UpdatePriority::Fast),
            "normal" => Ok(UpdatePriority::Normal),
            "slow" => Ok(UpdatePriority::Slow),
            other => Err(ValidationError::InvalidInput(format!(
                "unknown update priority '{}'",
                other
            ))),
        }
    }
}

/// Delays used by the update scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub immediate: Duration,
    pub fast: Duration,
    pub normal: Duration,
    pub slow: Duration,
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            immediate: IMMEDIATE_DELAY,
            fast: FAST_DELAY,
            normal: NORMAL_DELAY,
            slow: SLOW_DELAY,
            retry_delay: RETRY_DELAY,
        }
    }
}

impl SchedulerConfig {
    pub fn delay_for(&self, priority: UpdatePriority) -> Duration {
        match priority {
            UpdatePriority::Immediate => self.immediate,
            UpdatePriority::Fast => self.fast,
            UpdatePriority::Normal => self.normal,
            UpdatePriority::Slow => self.slow,
        }
    }

    /// Total wait before a retry commit: the fixed retry delay plus the slow tier.
    pub fn retry_window(&self) -> Duration {
        self.retry_delay + self.slow
    }
}

/// Async commit invoked with the debounced value.
pub type CommitFn<V> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wraps an async closure as a `CommitFn`.
pub fn commit_fn<V, F, Fut>(f: F) -> CommitFn<V>
where
    F: Fn(V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |value| f(value).boxed())
}
