//! SQLite-backed event store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::max;
use diesel::prelude::*;

use ledgerfolio_core::errors::{ConflictError, Error};
use ledgerfolio_core::events::{EventRecord, EventStoreTrait, NewEvent, PortfolioId};
use ledgerfolio_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::events::model::EventRecordDB;

/// Durable event store over the `events` table.
///
/// Appends run on the writer actor: the version check and the batch insert
/// share one immediate transaction, which makes check-then-insert race free.
/// The UNIQUE (aggregate_id, aggregate_version) index backs that up at the
/// storage level. Reads run on pooled connections.
pub struct SqliteEventStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

/// What an append decided inside the writer transaction.
///
/// A conflict travels in the Ok position because the write actor stringifies
/// errors at its transaction boundary; the typed `Error::Conflict` is rebuilt
/// on this side so retry loops can still match on it.
enum AppendOutcome {
    Committed(u64),
    Conflict(u64),
}

impl SqliteEventStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl EventStoreTrait for SqliteEventStore {
    async fn append(
        &self,
        aggregate_id: &PortfolioId,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<u64> {
        let aggregate = aggregate_id.clone();

        let outcome = self
            .writer
            .exec(move |conn| {
                use crate::schema::events::dsl;

                let current: Option<i64> = dsl::events
                    .filter(dsl::aggregate_id.eq(aggregate.as_str()))
                    .select(max(dsl::aggregate_version))
                    .first(conn)
                    .into_core()?;
                let actual = current.unwrap_or(0) as u64;

                if actual != expected_version {
                    return Ok(AppendOutcome::Conflict(actual));
                }
                if events.is_empty() {
                    return Ok(AppendOutcome::Committed(actual));
                }

                // One recorded_at for the whole batch: the append is a single
                // atomic acceptance.
                let recorded_at = Utc::now();
                let rows = events
                    .into_iter()
                    .enumerate()
                    .map(|(offset, event)| {
                        let version = expected_version + offset as u64 + 1;
                        EventRecordDB::from_record(&EventRecord::seal(
                            &aggregate,
                            version,
                            event,
                            recorded_at,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let new_version = expected_version + rows.len() as u64;

                diesel::insert_into(dsl::events)
                    .values(&rows)
                    .execute(conn)
                    .into_core()?;

                Ok(AppendOutcome::Committed(new_version))
            })
            .await?;

        match outcome {
            AppendOutcome::Committed(version) => Ok(version),
            AppendOutcome::Conflict(actual) => Err(Error::Conflict(ConflictError {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
                actual,
            })),
        }
    }

    fn read_from(&self, aggregate_id: &PortfolioId, from_version: u64) -> Result<Vec<EventRecord>> {
        use crate::schema::events::dsl;

        let mut conn = get_connection(&self.pool)?;
        let rows = dsl::events
            .filter(dsl::aggregate_id.eq(aggregate_id.as_str()))
            .filter(dsl::aggregate_version.ge(from_version as i64))
            .order(dsl::aggregate_version.asc())
            .load::<EventRecordDB>(&mut conn)
            .into_core()?;

        rows.into_iter().map(EventRecordDB::into_record).collect()
    }

    fn current_version(&self, aggregate_id: &PortfolioId) -> Result<u64> {
        use crate::schema::events::dsl;

        let mut conn = get_connection(&self.pool)?;
        let current: Option<i64> = dsl::events
            .filter(dsl::aggregate_id.eq(aggregate_id.as_str()))
            .select(max(dsl::aggregate_version))
            .first(&mut conn)
            .into_core()?;

        Ok(current.unwrap_or(0) as u64)
    }

    fn aggregate_ids(&self) -> Result<Vec<PortfolioId>> {
        use crate::schema::events::dsl;

        let mut conn = get_connection(&self.pool)?;
        let ids = dsl::events
            .select(dsl::aggregate_id)
            .distinct()
            .order(dsl::aggregate_id.asc())
            .load::<String>(&mut conn)
            .into_core()?;

        Ok(ids.into_iter().map(PortfolioId::from).collect())
    }
}
