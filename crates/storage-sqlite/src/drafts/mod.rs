//! SQLite storage implementation for form drafts.

mod backend;
mod model;

pub use backend::SqliteDraftBackend;
pub use model::DraftDB;

// Re-export trait from core for convenience
pub use opsdesk_core::drafts::DraftBackend;
