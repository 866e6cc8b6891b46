//! Snapshot store contract.

use async_trait::async_trait;

use super::PortfolioSnapshot;
use crate::errors::Result;
use crate::events::PortfolioId;

/// Storage for aggregate snapshots.
///
/// At most one snapshot per aggregate is retained; `save` replaces any
/// earlier one. Implementations must tolerate deletion at any time:
/// snapshots are derived data and the event stream remains the only
/// source of truth.
#[async_trait]
pub trait SnapshotStoreTrait: Send + Sync {
    /// Saves `snapshot`, replacing the aggregate's previous snapshot.
    async fn save(&self, snapshot: &PortfolioSnapshot) -> Result<()>;

    /// Loads the aggregate's snapshot, if one exists.
    fn load_latest(&self, aggregate_id: &PortfolioId) -> Result<Option<PortfolioSnapshot>>;

    /// Drops the aggregate's snapshot. Dropping a missing one is not an
    /// error.
    async fn delete(&self, aggregate_id: &PortfolioId) -> Result<()>;
}
