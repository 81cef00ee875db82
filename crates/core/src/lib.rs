//! Opsdesk Core - reconciliation and synchronization for the operations dashboard.
//!
//! This crate holds the four components dashboards talk to:
//!
//! - **Priority merge engine** (`clients`) - reconciles the three client tiers
//! - **Update scheduler** (`scheduler`) - per-key debounced commits
//! - **Durable draft store** (`drafts`) - retrying, expiring form drafts
//! - **Synchronization bus** (`sync`) - pub/sub plus a retrying FIFO queue
//!
//! It is database-agnostic: remote collections and draft persistence are
//! traits implemented by the `storage-sqlite` crate.

pub mod clients;
pub mod collections;
pub mod drafts;
pub mod errors;
pub mod scheduler;
pub mod sync;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
