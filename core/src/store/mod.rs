// Store module — durable offline cache and the shared inbox queue

pub mod cache;
pub mod inbox;

pub use cache::{CacheError, CleanupReport, OfflineCache};
pub use inbox::Inbox;
