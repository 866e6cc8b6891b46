//! Database model for rows in `snapshots`.

use diesel::prelude::*;

use ledgerfolio_core::errors::{DatabaseError, Error};
use ledgerfolio_core::events::PortfolioId;
use ledgerfolio_core::portfolio::snapshot::PortfolioSnapshot;
use ledgerfolio_core::Result;

use crate::utils::{decode_timestamp, encode_timestamp};

/// Database model for one aggregate snapshot. The primary key is the
/// aggregate id: at most one snapshot per aggregate is retained.
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PortfolioSnapshotDB {
    pub aggregate_id: String,
    pub aggregate_version: i64,
    /// Full `Portfolio` state as JSON.
    pub state: String,
    pub taken_at: String,
}

impl PortfolioSnapshotDB {
    pub fn from_snapshot(snapshot: &PortfolioSnapshot) -> Result<Self> {
        let state = serde_json::to_string(&snapshot.state).map_err(|e| {
            Error::Database(DatabaseError::Serialization(format!(
                "snapshot {} v{} state: {e}",
                snapshot.aggregate_id, snapshot.version
            )))
        })?;

        Ok(Self {
            aggregate_id: snapshot.aggregate_id.to_string(),
            aggregate_version: snapshot.version as i64,
            state,
            taken_at: encode_timestamp(&snapshot.taken_at),
        })
    }

    /// Decodes a stored snapshot. An undecodable row is an error; callers
    /// treat it as a missing snapshot and fall back to full replay.
    pub fn into_snapshot(self) -> Result<PortfolioSnapshot> {
        let state = serde_json::from_str(&self.state).map_err(|e| {
            Error::Database(DatabaseError::Serialization(format!(
                "snapshot {} v{} state: {e}",
                self.aggregate_id, self.aggregate_version
            )))
        })?;

        Ok(PortfolioSnapshot {
            aggregate_id: PortfolioId::from(self.aggregate_id),
            version: self.aggregate_version as u64,
            state,
            taken_at: decode_timestamp("taken_at", &self.taken_at)?,
        })
    }
}
