//! In-memory snapshot store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{PortfolioSnapshot, SnapshotStoreTrait};
use crate::errors::Result;
use crate::events::PortfolioId;

#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: DashMap<PortfolioId, PortfolioSnapshot>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStoreTrait for InMemorySnapshotStore {
    async fn save(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        self.snapshots
            .insert(snapshot.aggregate_id.clone(), snapshot.clone());
        Ok(())
    }

    fn load_latest(&self, aggregate_id: &PortfolioId) -> Result<Option<PortfolioSnapshot>> {
        Ok(self.snapshots.get(aggregate_id).map(|s| s.clone()))
    }

    async fn delete(&self, aggregate_id: &PortfolioId) -> Result<()> {
        self.snapshots.remove(aggregate_id);
        Ok(())
    }
}
