//! In-memory read models. Used by tests and embedders without durability;
//! the storage crate implements the same traits on SQLite.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    HoldingRow, HoldingsReadModelTrait, LedgerEntryFilter, LedgerEntryRow, LedgerReadModelTrait,
    ProjectionCheckpointTrait,
};
use crate::errors::Result;
use crate::events::{PortfolioId, Symbol};

#[derive(Default)]
pub struct InMemoryHoldings {
    rows: DashMap<PortfolioId, HashMap<Symbol, HoldingRow>>,
}

impl InMemoryHoldings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HoldingsReadModelTrait for InMemoryHoldings {
    async fn upsert(&self, row: HoldingRow) -> Result<()> {
        self.rows
            .entry(row.aggregate_id.clone())
            .or_default()
            .insert(row.symbol.clone(), row);
        Ok(())
    }

    fn holdings(&self, aggregate_id: &PortfolioId) -> Result<Vec<HoldingRow>> {
        let Some(rows) = self.rows.get(aggregate_id) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<HoldingRow> = rows.values().cloned().collect();
        out.sort_by(|a, b| a.symbol.as_str().cmp(b.symbol.as_str()));
        Ok(out)
    }

    async fn clear(&self) -> Result<()> {
        self.rows.clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLedger {
    rows: DashMap<PortfolioId, Vec<LedgerEntryRow>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerReadModelTrait for InMemoryLedger {
    async fn insert(&self, row: LedgerEntryRow) -> Result<()> {
        let mut rows = self.rows.entry(row.aggregate_id.clone()).or_default();
        if rows.iter().any(|existing| existing.event_id == row.event_id) {
            return Ok(());
        }
        rows.push(row);
        rows.sort_by_key(|r| r.version);
        Ok(())
    }

    fn entries(
        &self,
        aggregate_id: &PortfolioId,
        filter: &LedgerEntryFilter,
    ) -> Result<Vec<LedgerEntryRow>> {
        let Some(rows) = self.rows.get(aggregate_id) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.rows.clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProjectionCheckpoints {
    versions: DashMap<PortfolioId, u64>,
}

impl InMemoryProjectionCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectionCheckpointTrait for InMemoryProjectionCheckpoints {
    async fn save(&self, aggregate_id: &PortfolioId, version: u64) -> Result<()> {
        self.versions.insert(aggregate_id.clone(), version);
        Ok(())
    }

    fn load(&self, aggregate_id: &PortfolioId) -> Result<u64> {
        Ok(self
            .versions
            .get(aggregate_id)
            .map(|v| *v)
            .unwrap_or(0))
    }

    async fn reset(&self) -> Result<()> {
        self.versions.clear();
        Ok(())
    }
}
