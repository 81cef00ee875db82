//! Synchronization bus: publish/subscribe plus a retrying operation queue.

mod change_feed;
mod sync_bus;
mod sync_model;

#[cfg(test)]
mod sync_bus_tests;

pub use change_feed::{forward_changes, ChangeFeedWorker, FeedEvent};
pub use sync_bus::SyncBus;
pub use sync_model::*;
