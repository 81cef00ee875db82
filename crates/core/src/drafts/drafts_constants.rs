use std::time::Duration;

/// Envelope version written by this store.
pub const DRAFT_VERSION: &str = "3.0";

/// Key written and removed once to check the backend is usable.
pub const PROBE_KEY: &str = "__storage_test__";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Prefix of employee form draft keys.
pub const EMPLOYEE_FORM_PREFIX: &str = "employee_form_";

/// Top-level sections that make an employee form draft worth resuming.
pub const SIGNIFICANT_SECTIONS: [&str; 5] = ["employee", "clients", "learning", "meta", "feedback"];
