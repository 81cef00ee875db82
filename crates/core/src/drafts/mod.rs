//! Durable draft store for in-progress form edits.

mod draft_autosave;
mod draft_store;
mod drafts_constants;
mod drafts_model;
mod drafts_traits;
mod memory_backend;


pub use draft_autosave::DraftAutosave;
pub use draft_store::DraftStore;
pub use drafts_constants::*;
pub use drafts_model::*;
pub use drafts_traits::DraftBackend;
pub use memory_backend::MemoryDraftBackend;
