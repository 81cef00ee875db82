//! Remote record collections backing the three client origins.

mod collections_model;
mod collections_traits;
mod memory_collection;

pub use collections_model::*;
pub use collections_traits::RecordCollection;
pub use memory_collection::InMemoryCollection;
