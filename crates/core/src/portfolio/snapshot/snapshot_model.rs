//! Snapshot model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::PortfolioId;
use crate::portfolio::Portfolio;

/// A point-in-time copy of aggregate state at an exact stream version.
///
/// Snapshots only shorten replay. They are never the source of truth and
/// may be deleted at any time; the stream rebuilds identical state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub aggregate_id: PortfolioId,
    /// Version of the last event folded into `state`.
    pub version: u64,
    pub state: Portfolio,
    pub taken_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    /// Captures the given state as a snapshot at its current version.
    pub fn capture(state: Portfolio) -> Self {
        Self {
            aggregate_id: state.aggregate_id.clone(),
            version: state.version,
            taken_at: Utc::now(),
            state,
        }
    }
}
