//! SQLite storage implementation for the operations dashboard.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the seams defined in `opsdesk-core` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - A single-writer actor that serializes writes
//! - `SqliteDraftBackend` for durable drafts
//! - `SqliteCollection` for the three client collections
//!
//! This crate is the only place in the workspace where Diesel dependencies exist.

pub mod collections;
pub mod db;
pub mod drafts;
pub mod errors;
pub mod schema;

pub use collections::SqliteCollection;
pub use db::{
    create_pool, get_connection, get_db_path, init, run_migrations, spawn_writer, DbConnection,
    DbPool, WriteHandle,
};
pub use drafts::SqliteDraftBackend;
pub use errors::{IntoCore, StorageError};

pub use opsdesk_core::errors::{DatabaseError, Error, Result};
