//! Portfolio aggregate state: positions backed by FIFO tax lots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::errors::{CommandError, Result};
use crate::events::{PortfolioId, Symbol};

// =============================================================================
// TaxLot
// =============================================================================

/// A parcel of shares acquired at one price on one date.
///
/// `quantity` is the originally acquired amount; `remaining_quantity`
/// shrinks as sales consume the lot. `unit_cost` never changes on partial
/// consumption. Splits rescale quantities and unit cost together, so the
/// lot's total cost is preserved.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaxLot {
    pub lot_id: String,
    pub acquired_at: DateTime<Utc>,
    pub quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub unit_cost: Decimal,
}

impl TaxLot {
    pub fn is_open(&self) -> bool {
        self.remaining_quantity > Decimal::ZERO
    }

    /// Cost basis of the unsold remainder.
    pub fn remaining_cost_basis(&self) -> Decimal {
        self.remaining_quantity * self.unit_cost
    }
}

// =============================================================================
// LotConsumption
// =============================================================================

/// A slice of one tax lot consumed by a sale.
///
/// Sales return these in consumption order (oldest lot first) so callers
/// can attribute realized P&L per lot.
#[derive(Debug, Clone, PartialEq)]
pub struct LotConsumption {
    pub lot_id: String,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

impl LotConsumption {
    /// Realized gain or loss of this slice at the given sale price.
    pub fn realized_pnl(&self, sale_price: Decimal) -> Decimal {
        (sale_price - self.unit_cost) * self.quantity
    }
}

// =============================================================================
// Position
// =============================================================================

/// Open holding for one symbol.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: Symbol,
    /// Total open quantity. Always equals the sum of remaining lot quantities.
    pub quantity: Decimal,
    /// Lots ordered oldest acquisition first. Spent lots are retained with
    /// `remaining_quantity` zero for audit.
    pub lots: VecDeque<TaxLot>,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: Symbol, opened_at: DateTime<Utc>) -> Self {
        Position {
            symbol,
            quantity: Decimal::ZERO,
            lots: VecDeque::new(),
            opened_at,
        }
    }

    /// Adds an acquisition lot, keeping lots ordered by acquisition date.
    pub fn add_lot(
        &mut self,
        lot_id: String,
        quantity: Decimal,
        unit_cost: Decimal,
        acquired_at: DateTime<Utc>,
    ) {
        self.lots.push_back(TaxLot {
            lot_id,
            acquired_at,
            quantity,
            remaining_quantity: quantity,
            unit_cost,
        });
        // Stable sort: same-date lots keep their insertion (stream) order.
        let mut lots: Vec<_> = self.lots.drain(..).collect();
        lots.sort_by_key(|lot| lot.acquired_at);
        self.lots = lots.into();

        self.recalculate_quantity();
    }

    /// Consumes `quantity` across open lots, oldest first.
    ///
    /// A partially consumed lot keeps its original `quantity` and
    /// `unit_cost`; only `remaining_quantity` shrinks. Fails without
    /// touching any lot when the open quantity is insufficient.
    pub fn consume_fifo(&mut self, quantity: Decimal) -> Result<Vec<LotConsumption>> {
        if quantity <= Decimal::ZERO {
            return Err(CommandError::NonPositiveQuantity(quantity).into());
        }
        if self.quantity < quantity {
            return Err(CommandError::InsufficientShares {
                symbol: self.symbol.to_string(),
                requested: quantity,
                held: self.quantity,
            }
            .into());
        }

        let mut left = quantity;
        let mut consumed = Vec::new();
        for lot in &mut self.lots {
            if left <= Decimal::ZERO {
                break;
            }
            if !lot.is_open() {
                continue;
            }
            let take = lot.remaining_quantity.min(left);
            lot.remaining_quantity -= take;
            left -= take;
            consumed.push(LotConsumption {
                lot_id: lot.lot_id.clone(),
                quantity: take,
                unit_cost: lot.unit_cost,
            });
        }

        self.recalculate_quantity();
        Ok(consumed)
    }

    /// Applies a share split: `ratio` new shares replace each old share.
    ///
    /// Scales every lot's quantities by `ratio` and divides its unit cost
    /// by `ratio`, leaving each lot's total cost unchanged.
    pub fn apply_split(&mut self, ratio: Decimal) {
        for lot in &mut self.lots {
            lot.quantity *= ratio;
            lot.remaining_quantity *= ratio;
            lot.unit_cost /= ratio;
        }
        self.recalculate_quantity();
    }

    /// Cost basis of all open lots.
    pub fn cost_basis(&self) -> Decimal {
        self.lots.iter().map(TaxLot::remaining_cost_basis).sum()
    }

    /// Average cost per open share; zero when the position is flat.
    pub fn average_cost(&self) -> Decimal {
        if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.cost_basis() / self.quantity
        }
    }

    pub fn open_lots(&self) -> impl Iterator<Item = &TaxLot> {
        self.lots.iter().filter(|lot| lot.is_open())
    }

    fn recalculate_quantity(&mut self) {
        self.quantity = self.lots.iter().map(|lot| lot.remaining_quantity).sum();
    }
}

// =============================================================================
// Portfolio
// =============================================================================

/// Lifecycle status carried in aggregate state.
///
/// A portfolio that has not yet recorded its genesis event is represented
/// by `version == 0`, not by a status variant.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PortfolioStatus {
    Active,
    Closed,
}

/// Aggregate state rebuilt by folding a portfolio's event stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub aggregate_id: PortfolioId,
    pub owner_id: String,
    pub name: String,
    pub status: PortfolioStatus,
    pub positions: HashMap<Symbol, Position>,
    /// Version of the last applied event; 0 before genesis.
    pub version: u64,
}

impl Portfolio {
    /// Pre-genesis seed state for replay.
    pub fn seed(aggregate_id: PortfolioId) -> Self {
        Portfolio {
            aggregate_id,
            owner_id: String::new(),
            name: String::new(),
            status: PortfolioStatus::Active,
            positions: HashMap::new(),
            version: 0,
        }
    }

    /// True once the genesis event has been applied.
    pub fn exists(&self) -> bool {
        self.version > 0
    }

    pub fn is_closed(&self) -> bool {
        self.status == PortfolioStatus::Closed
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Open quantity held for a symbol; zero when no position exists.
    pub fn held_quantity(&self, symbol: &Symbol) -> Decimal {
        self.positions
            .get(symbol)
            .map(|position| position.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}
