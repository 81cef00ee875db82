//! Update scheduler: per-key debounced commits with priority tiers.

mod scheduler_model;
mod update_scheduler;


pub use scheduler_model::*;
pub use update_scheduler::{ScheduledUpdate, UpdateScheduler};
