//! Storage traits for the projection read models.
//!
//! Same split as the event store traits: async writes, sync reads. In-memory
//! implementations live in this module tree; `ledgerfolio-storage-sqlite`
//! provides the durable ones.

use async_trait::async_trait;

use super::{HoldingRow, LedgerEntryFilter, LedgerEntryRow};
use crate::errors::Result;
use crate::events::PortfolioId;

/// Current-positions read model: one row per (portfolio, symbol).
#[async_trait]
pub trait HoldingsReadModelTrait: Send + Sync {
    /// Inserts or replaces the row for `(row.aggregate_id, row.symbol)`.
    async fn upsert(&self, row: HoldingRow) -> Result<()>;

    /// All holding rows for one portfolio, ordered by symbol.
    fn holdings(&self, aggregate_id: &PortfolioId) -> Result<Vec<HoldingRow>>;

    /// Drops every row. Used by projection rebuild.
    async fn clear(&self) -> Result<()>;
}

/// Transaction-history read model, append-shaped.
#[async_trait]
pub trait LedgerReadModelTrait: Send + Sync {
    /// Records one ledger row. Idempotent by `event_id`: re-inserting an
    /// already recorded event must not duplicate the row.
    async fn insert(&self, row: LedgerEntryRow) -> Result<()>;

    /// Matching rows for one portfolio in stream order.
    fn entries(
        &self,
        aggregate_id: &PortfolioId,
        filter: &LedgerEntryFilter,
    ) -> Result<Vec<LedgerEntryRow>>;

    /// Drops every row. Used by projection rebuild.
    async fn clear(&self) -> Result<()>;
}

/// Per-aggregate projection progress: the last applied stream version.
#[async_trait]
pub trait ProjectionCheckpointTrait: Send + Sync {
    async fn save(&self, aggregate_id: &PortfolioId, version: u64) -> Result<()>;

    /// Last applied version, 0 when the aggregate has never been projected.
    fn load(&self, aggregate_id: &PortfolioId) -> Result<u64>;

    /// Forgets all progress. Used by projection rebuild.
    async fn reset(&self) -> Result<()>;
}
