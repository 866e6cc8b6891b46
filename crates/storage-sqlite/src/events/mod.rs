//! SQLite storage implementation for the event streams.

mod model;
mod repository;

pub use model::EventRecordDB;
pub use repository::SqliteEventStore;

// Re-export trait from core for convenience
pub use ledgerfolio_core::events::EventStoreTrait;
