//! Priority merge engine for client entities.
//!
//! Three origins describe the same client: the client's own onboarding form
//! (self-reported), the curated registry, and employee submissions
//! (reported-by-other). `ClientMergeService` reconciles them field by field,
//! self-reported first, and caches the self-reported table for a bounded TTL.

mod client_source;
mod clients_constants;
mod clients_model;
mod clients_service;
mod clients_traits;


pub use client_source::CollectionClientSource;
pub use clients_constants::*;
pub use clients_model::*;
pub use clients_service::ClientMergeService;
pub use clients_traits::{ClientMergeServiceTrait, ClientSource};
