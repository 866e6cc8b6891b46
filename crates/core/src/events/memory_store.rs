//! In-memory event store.
//!
//! Keeps whole streams in a concurrent map. Used by tests and by embedders
//! that do not need durability; `ledgerfolio-storage-sqlite` provides the
//! durable implementation of the same trait.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{EventRecord, EventStoreTrait, NewEvent, PortfolioId};
use crate::errors::{ConflictError, Error, Result};

#[derive(Default)]
pub struct InMemoryEventStore {
    streams: DashMap<PortfolioId, Vec<EventRecord>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStoreTrait for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: &PortfolioId,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<u64> {
        // The shard lock held by `entry` makes the compare-and-append atomic.
        let mut stream = self.streams.entry(aggregate_id.clone()).or_default();
        let actual = stream.len() as u64;
        if actual != expected_version {
            let conflict = ConflictError {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
                actual,
            };
            drop(stream);
            self.streams.remove_if(aggregate_id, |_, s| s.is_empty());
            return Err(Error::Conflict(conflict));
        }

        let recorded_at = Utc::now();
        for event in events {
            let version = stream.len() as u64 + 1;
            stream.push(EventRecord::seal(aggregate_id, version, event, recorded_at));
        }
        Ok(stream.len() as u64)
    }

    fn read_from(&self, aggregate_id: &PortfolioId, from_version: u64) -> Result<Vec<EventRecord>> {
        let Some(stream) = self.streams.get(aggregate_id) else {
            return Ok(Vec::new());
        };
        let skip = from_version.saturating_sub(1) as usize;
        Ok(stream.iter().skip(skip).cloned().collect())
    }

    fn current_version(&self, aggregate_id: &PortfolioId) -> Result<u64> {
        Ok(self
            .streams
            .get(aggregate_id)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }

    fn aggregate_ids(&self) -> Result<Vec<PortfolioId>> {
        Ok(self.streams.iter().map(|e| e.key().clone()).collect())
    }
}
