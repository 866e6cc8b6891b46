//! SQLite storage implementation for aggregate snapshots.

mod model;
mod repository;

pub use model::PortfolioSnapshotDB;
pub use repository::SqliteSnapshotStore;

// Re-export trait from core for convenience
pub use ledgerfolio_core::portfolio::snapshot::SnapshotStoreTrait;
