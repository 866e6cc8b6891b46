//! Read-side facade over the read models and derived engines.
//!
//! Everything served here is eventually consistent with the event log:
//! holdings and history lag by projection latency, valuations and risk by
//! engine latency. None of these calls touch the write path.

use std::sync::Arc;

use crate::errors::Result;
use crate::events::PortfolioId;
use crate::projections::{
    HoldingRow, HoldingsReadModelTrait, LedgerEntryFilter, LedgerEntryRow, LedgerReadModelTrait,
};
use crate::risk::{RiskEngine, RiskSnapshot};
use crate::valuation::{PortfolioValuation, ValuationEngine};

pub struct QueryService {
    holdings: Arc<dyn HoldingsReadModelTrait>,
    ledger: Arc<dyn LedgerReadModelTrait>,
    valuation: Arc<ValuationEngine>,
    risk: Arc<RiskEngine>,
}

impl QueryService {
    pub fn new(
        holdings: Arc<dyn HoldingsReadModelTrait>,
        ledger: Arc<dyn LedgerReadModelTrait>,
        valuation: Arc<ValuationEngine>,
        risk: Arc<RiskEngine>,
    ) -> Self {
        Self {
            holdings,
            ledger,
            valuation,
            risk,
        }
    }

    /// Current positions of one portfolio, ordered by symbol.
    pub fn positions(&self, aggregate_id: &PortfolioId) -> Result<Vec<HoldingRow>> {
        self.holdings.holdings(aggregate_id)
    }

    /// Filtered transaction history in stream order.
    pub fn transaction_history(
        &self,
        aggregate_id: &PortfolioId,
        filter: &LedgerEntryFilter,
    ) -> Result<Vec<LedgerEntryRow>> {
        self.ledger.entries(aggregate_id, filter)
    }

    /// Latest valuation of one portfolio.
    pub fn valuation(&self, aggregate_id: &PortfolioId) -> Result<PortfolioValuation> {
        self.valuation.valuation(aggregate_id)
    }

    /// Latest risk metrics of one portfolio.
    pub fn risk_snapshot(&self, aggregate_id: &PortfolioId) -> Result<RiskSnapshot> {
        self.risk.risk_snapshot(aggregate_id)
    }
}
