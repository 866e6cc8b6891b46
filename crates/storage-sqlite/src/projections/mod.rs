//! SQLite storage implementation for the projection read models.

mod model;
mod repository;

pub use model::{HoldingRowDB, LedgerEntryRowDB, ProjectionCheckpointDB};
pub use repository::{
    SqliteHoldingsReadModel, SqliteLedgerReadModel, SqliteProjectionCheckpoints,
};

// Re-export traits from core for convenience
pub use ledgerfolio_core::projections::{
    HoldingsReadModelTrait, LedgerReadModelTrait, ProjectionCheckpointTrait,
};
