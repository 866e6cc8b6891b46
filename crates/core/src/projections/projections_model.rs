//! Read-model rows maintained by the projection engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::{EventRecord, PortfolioEvent, PortfolioId, Symbol};
use crate::portfolio::Position;

// =============================================================================
// HoldingRow
// =============================================================================

/// One row of the current-positions read model: the live view of a single
/// (portfolio, symbol) holding. Rows survive at quantity zero once a position
/// has been fully sold; positions are never deleted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldingRow {
    pub aggregate_id: PortfolioId,
    pub symbol: Symbol,
    pub quantity: Decimal,
    /// Remaining cost of the open tax lots.
    pub cost_basis: Decimal,
    /// Cost basis divided by quantity; zero for an empty position.
    pub average_cost: Decimal,
    pub opened_at: DateTime<Utc>,
    /// `recorded_at` of the last event that touched this row.
    pub updated_at: DateTime<Utc>,
}

impl HoldingRow {
    /// Builds the row for a position as of `record`.
    pub fn from_position(
        aggregate_id: &PortfolioId,
        position: &Position,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.clone(),
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            cost_basis: position.cost_basis(),
            average_cost: position.average_cost(),
            opened_at: position.opened_at,
            updated_at,
        }
    }
}

// =============================================================================
// LedgerEntryRow
// =============================================================================

/// Kind tag of a ledger entry, mirroring the event type tags.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    PortfolioOpened,
    PositionOpened,
    SharesBought,
    SharesSold,
    DividendReceived,
    CorporateActionApplied,
    PortfolioRenamed,
    PortfolioClosed,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::PortfolioOpened => "portfolio_opened",
            LedgerEntryKind::PositionOpened => "position_opened",
            LedgerEntryKind::SharesBought => "shares_bought",
            LedgerEntryKind::SharesSold => "shares_sold",
            LedgerEntryKind::DividendReceived => "dividend_received",
            LedgerEntryKind::CorporateActionApplied => "corporate_action_applied",
            LedgerEntryKind::PortfolioRenamed => "portfolio_renamed",
            LedgerEntryKind::PortfolioClosed => "portfolio_closed",
        }
    }

    /// Inverse of [`as_str`](Self::as_str). `None` for tags outside the set.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "portfolio_opened" => Some(LedgerEntryKind::PortfolioOpened),
            "position_opened" => Some(LedgerEntryKind::PositionOpened),
            "shares_bought" => Some(LedgerEntryKind::SharesBought),
            "shares_sold" => Some(LedgerEntryKind::SharesSold),
            "dividend_received" => Some(LedgerEntryKind::DividendReceived),
            "corporate_action_applied" => Some(LedgerEntryKind::CorporateActionApplied),
            "portfolio_renamed" => Some(LedgerEntryKind::PortfolioRenamed),
            "portfolio_closed" => Some(LedgerEntryKind::PortfolioClosed),
            _ => None,
        }
    }

    fn of(event: &PortfolioEvent) -> Self {
        match event {
            PortfolioEvent::PortfolioOpened { .. } => LedgerEntryKind::PortfolioOpened,
            PortfolioEvent::PositionOpened { .. } => LedgerEntryKind::PositionOpened,
            PortfolioEvent::SharesBought { .. } => LedgerEntryKind::SharesBought,
            PortfolioEvent::SharesSold { .. } => LedgerEntryKind::SharesSold,
            PortfolioEvent::DividendReceived { .. } => LedgerEntryKind::DividendReceived,
            PortfolioEvent::CorporateActionApplied { .. } => {
                LedgerEntryKind::CorporateActionApplied
            }
            PortfolioEvent::PortfolioRenamed { .. } => LedgerEntryKind::PortfolioRenamed,
            PortfolioEvent::PortfolioClosed {} => LedgerEntryKind::PortfolioClosed,
        }
    }
}

/// One row of the transaction-history read model. Flat enough to list and
/// filter; the full payload stays in the event store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryRow {
    pub event_id: String,
    pub aggregate_id: PortfolioId,
    pub version: u64,
    pub kind: LedgerEntryKind,
    pub symbol: Option<Symbol>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    /// Trade value for buys/sells, cash amount for dividends.
    pub amount: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntryRow {
    pub fn from_record(record: &EventRecord) -> Self {
        let (quantity, unit_price, amount) = match &record.payload {
            PortfolioEvent::SharesBought {
                quantity,
                unit_price,
                ..
            }
            | PortfolioEvent::SharesSold {
                quantity,
                unit_price,
                ..
            } => (
                Some(*quantity),
                Some(*unit_price),
                Some(*quantity * *unit_price),
            ),
            PortfolioEvent::DividendReceived { amount, .. } => (None, None, Some(*amount)),
            _ => (None, None, None),
        };

        Self {
            event_id: record.event_id.clone(),
            aggregate_id: record.aggregate_id.clone(),
            version: record.version,
            kind: LedgerEntryKind::of(&record.payload),
            symbol: record.payload.symbol().cloned(),
            quantity,
            unit_price,
            amount,
            occurred_at: record.occurred_at,
            recorded_at: record.recorded_at,
        }
    }
}

// =============================================================================
// LedgerEntryFilter
// =============================================================================

/// History query filter. All set fields must match; `from`/`to` bound
/// `occurred_at` inclusively.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryFilter {
    pub symbol: Option<Symbol>,
    pub kind: Option<LedgerEntryKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl LedgerEntryFilter {
    pub fn matches(&self, row: &LedgerEntryRow) -> bool {
        if let Some(symbol) = &self.symbol {
            if row.symbol.as_ref() != Some(symbol) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if row.kind != kind {
                return false;
            }
        }
        if let Some(from) = self.from {
            if row.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if row.occurred_at > to {
                return false;
            }
        }
        true
    }
}
