//! Event store contract.

use async_trait::async_trait;

use super::{EventRecord, NewEvent, PortfolioId};
use crate::errors::Result;

/// Append-only, per-aggregate ordered event streams.
///
/// Appends are atomic and contiguous per aggregate: `append` either writes
/// every event at versions `expected_version + 1 ..` or writes nothing and
/// returns `Error::Conflict` with the actual stream version. Readers always
/// observe a gap-free prefix of each stream.
#[async_trait]
pub trait EventStoreTrait: Send + Sync {
    /// Appends `events` directly after `expected_version` and returns the
    /// new stream version.
    ///
    /// `expected_version` is the version the caller based its decision on;
    /// 0 means the caller expects an empty stream. When another writer got
    /// there first the append fails with `Error::Conflict` and nothing is
    /// written.
    async fn append(
        &self,
        aggregate_id: &PortfolioId,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<u64>;

    /// Reads events with `version >= from_version`, in version order.
    /// An unknown aggregate yields an empty vector.
    fn read_from(&self, aggregate_id: &PortfolioId, from_version: u64) -> Result<Vec<EventRecord>>;

    /// Current stream version. 0 for a stream with no events.
    fn current_version(&self, aggregate_id: &PortfolioId) -> Result<u64>;

    /// All aggregate ids with at least one recorded event.
    fn aggregate_ids(&self) -> Result<Vec<PortfolioId>>;
}
