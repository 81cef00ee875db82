//! SQLite storage implementation for the client collections.

mod model;
mod repository;

pub use model::RecordDB;
pub use repository::SqliteCollection;

// Re-export trait from core for convenience
pub use opsdesk_core::collections::RecordCollection;
