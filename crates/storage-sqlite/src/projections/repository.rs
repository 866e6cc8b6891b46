//! SQLite-backed projection read models.
//!
//! Writes arrive from the projection engine one event at a time and go
//! through the writer actor; queries run on pooled connections. All three
//! repositories tolerate redelivery: upserts overwrite by primary key and
//! ledger inserts ignore duplicates.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;

use ledgerfolio_core::events::PortfolioId;
use ledgerfolio_core::projections::{
    HoldingRow, HoldingsReadModelTrait, LedgerEntryFilter, LedgerEntryRow, LedgerReadModelTrait,
    ProjectionCheckpointTrait,
};
use ledgerfolio_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::projections::model::{HoldingRowDB, LedgerEntryRowDB, ProjectionCheckpointDB};
use crate::utils::encode_timestamp;

// =============================================================================
// Holdings view
// =============================================================================

/// Durable current-positions view over `holdings_view`.
pub struct SqliteHoldingsReadModel {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteHoldingsReadModel {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl HoldingsReadModelTrait for SqliteHoldingsReadModel {
    async fn upsert(&self, row: HoldingRow) -> Result<()> {
        let record = HoldingRowDB::from(&row);

        self.writer
            .exec(move |conn| {
                use crate::schema::holdings_view::dsl;

                diesel::replace_into(dsl::holdings_view)
                    .values(&record)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    fn holdings(&self, aggregate_id: &PortfolioId) -> Result<Vec<HoldingRow>> {
        use crate::schema::holdings_view::dsl;

        let mut conn = get_connection(&self.pool)?;
        let rows = dsl::holdings_view
            .filter(dsl::aggregate_id.eq(aggregate_id.as_str()))
            .order(dsl::symbol.asc())
            .load::<HoldingRowDB>(&mut conn)
            .into_core()?;

        rows.into_iter().map(HoldingRowDB::into_row).collect()
    }

    async fn clear(&self) -> Result<()> {
        self.writer
            .exec(move |conn| {
                use crate::schema::holdings_view::dsl;

                diesel::delete(dsl::holdings_view).execute(conn).into_core()?;
                Ok(())
            })
            .await
    }
}

// =============================================================================
// Ledger view
// =============================================================================

/// Durable transaction-history view over `ledger_view`.
pub struct SqliteLedgerReadModel {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteLedgerReadModel {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl LedgerReadModelTrait for SqliteLedgerReadModel {
    async fn insert(&self, row: LedgerEntryRow) -> Result<()> {
        let record = LedgerEntryRowDB::from(&row);

        self.writer
            .exec(move |conn| {
                use crate::schema::ledger_view::dsl;

                // Redelivered events are dropped on the event_id primary key,
                // keeping the view idempotent.
                diesel::insert_or_ignore_into(dsl::ledger_view)
                    .values(&record)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    fn entries(
        &self,
        aggregate_id: &PortfolioId,
        filter: &LedgerEntryFilter,
    ) -> Result<Vec<LedgerEntryRow>> {
        use crate::schema::ledger_view::dsl;

        let mut conn = get_connection(&self.pool)?;

        let mut query = dsl::ledger_view
            .filter(dsl::aggregate_id.eq(aggregate_id.as_str()))
            .into_boxed();

        if let Some(symbol) = &filter.symbol {
            query = query.filter(dsl::symbol.eq(symbol.as_str()));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(dsl::kind.eq(kind.as_str()));
        }
        // Range bounds compare as text; encoded timestamps are fixed width,
        // so text order is time order.
        if let Some(from) = filter.from {
            query = query.filter(dsl::occurred_at.ge(encode_timestamp(&from)));
        }
        if let Some(to) = filter.to {
            query = query.filter(dsl::occurred_at.le(encode_timestamp(&to)));
        }

        let rows = query
            .order(dsl::aggregate_version.asc())
            .load::<LedgerEntryRowDB>(&mut conn)
            .into_core()?;

        rows.into_iter().map(LedgerEntryRowDB::into_row).collect()
    }

    async fn clear(&self) -> Result<()> {
        self.writer
            .exec(move |conn| {
                use crate::schema::ledger_view::dsl;

                diesel::delete(dsl::ledger_view).execute(conn).into_core()?;
                Ok(())
            })
            .await
    }
}

// =============================================================================
// Projection checkpoints
// =============================================================================

/// Durable per-aggregate projection progress over `projection_checkpoints`.
pub struct SqliteProjectionCheckpoints {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteProjectionCheckpoints {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl ProjectionCheckpointTrait for SqliteProjectionCheckpoints {
    async fn save(&self, aggregate_id: &PortfolioId, version: u64) -> Result<()> {
        let record = ProjectionCheckpointDB {
            aggregate_id: aggregate_id.to_string(),
            last_version: version as i64,
            updated_at: encode_timestamp(&Utc::now()),
        };

        self.writer
            .exec(move |conn| {
                use crate::schema::projection_checkpoints::dsl;

                diesel::replace_into(dsl::projection_checkpoints)
                    .values(&record)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    fn load(&self, aggregate_id: &PortfolioId) -> Result<u64> {
        use crate::schema::projection_checkpoints::dsl;

        let mut conn = get_connection(&self.pool)?;
        let version: Option<i64> = dsl::projection_checkpoints
            .filter(dsl::aggregate_id.eq(aggregate_id.as_str()))
            .select(dsl::last_version)
            .first(&mut conn)
            .optional()
            .into_core()?;

        Ok(version.unwrap_or(0) as u64)
    }

    async fn reset(&self) -> Result<()> {
        self.writer
            .exec(move |conn| {
                use crate::schema::projection_checkpoints::dsl;

                diesel::delete(dsl::projection_checkpoints)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }
}
