//! SQLite-backed snapshot store.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;

use ledgerfolio_core::events::PortfolioId;
use ledgerfolio_core::portfolio::snapshot::{PortfolioSnapshot, SnapshotStoreTrait};
use ledgerfolio_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::snapshots::model::PortfolioSnapshotDB;

/// Durable snapshot store over the `snapshots` table.
pub struct SqliteSnapshotStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteSnapshotStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SnapshotStoreTrait for SqliteSnapshotStore {
    async fn save(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        let row = PortfolioSnapshotDB::from_snapshot(snapshot)?;

        self.writer
            .exec(move |conn| {
                use crate::schema::snapshots::dsl;

                diesel::replace_into(dsl::snapshots)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    fn load_latest(&self, aggregate_id: &PortfolioId) -> Result<Option<PortfolioSnapshot>> {
        use crate::schema::snapshots::dsl;

        let mut conn = get_connection(&self.pool)?;
        let row = dsl::snapshots
            .filter(dsl::aggregate_id.eq(aggregate_id.as_str()))
            .first::<PortfolioSnapshotDB>(&mut conn)
            .optional()
            .into_core()?;

        row.map(PortfolioSnapshotDB::into_snapshot).transpose()
    }

    async fn delete(&self, aggregate_id: &PortfolioId) -> Result<()> {
        let aggregate = aggregate_id.clone();

        self.writer
            .exec(move |conn| {
                use crate::schema::snapshots::dsl;

                diesel::delete(dsl::snapshots.filter(dsl::aggregate_id.eq(aggregate.as_str())))
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }
}
