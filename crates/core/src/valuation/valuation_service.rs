//! Valuation engine: FIFO cost-basis books plus the live price cache.
//!
//! Consumes the same committed records as the projector, but keeps richer
//! books: per-symbol tax lots, lifetime realized P&L and dividend income.
//! Price ticks recompute only the portfolios that hold the ticked symbol,
//! found through a symbol-to-holders index.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use dashmap::DashMap;
use log::{debug, warn};
use rust_decimal::Decimal;

use super::{PortfolioValuation, PositionValuation, ValuationConfig};
use crate::errors::{DatabaseError, Error, ReplayError, Result};
use crate::events::{
    CorporateActionKind, EventRecord, EventStoreTrait, PortfolioEvent, PortfolioId, Symbol,
};
use crate::portfolio::Position;
use crate::pricing::{PriceCache, PriceTick};

/// Receives every recomputed valuation. The risk engine is the in-crate
/// implementor; embedders can attach their own.
pub trait ValuationObserver: Send + Sync {
    fn on_valuation(&self, valuation: &PortfolioValuation);
}

/// Cost-basis book for one portfolio, maintained incrementally.
#[derive(Default)]
struct AggregateBook {
    positions: HashMap<Symbol, Position>,
    realized_pnl: Decimal,
    dividend_income: Decimal,
    /// Version of the last applied record; 0 before genesis.
    version: u64,
}

pub struct ValuationEngine {
    event_store: Arc<dyn EventStoreTrait>,
    prices: Arc<PriceCache>,
    config: ValuationConfig,
    books: DashMap<PortfolioId, AggregateBook>,
    holders: DashMap<Symbol, HashSet<PortfolioId>>,
    observers: RwLock<Vec<Arc<dyn ValuationObserver>>>,
}

impl ValuationEngine {
    pub fn new(event_store: Arc<dyn EventStoreTrait>, prices: Arc<PriceCache>) -> Self {
        Self {
            event_store,
            prices,
            config: ValuationConfig::default(),
            books: DashMap::new(),
            holders: DashMap::new(),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn with_config(mut self, config: ValuationConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers an observer for every recomputed valuation.
    pub fn subscribe(&self, observer: Arc<dyn ValuationObserver>) {
        if let Ok(mut observers) = self.observers.write() {
            observers.push(observer);
        }
    }

    /// Rebuilds all books from the event store. Called once at startup so
    /// valuations are available before any new event arrives.
    pub fn warm_start(&self) -> Result<usize> {
        let mut ids = self.event_store.aggregate_ids()?;
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for aggregate_id in &ids {
            self.catch_up(aggregate_id)?;
        }
        debug!("valuation warm start folded {} aggregates", ids.len());
        Ok(ids.len())
    }

    /// Applies one committed record to the aggregate's book and recomputes
    /// its valuation. Redelivered records are skipped; a version gap is
    /// healed from the event store before applying.
    pub fn handle_event(&self, record: &EventRecord) -> Result<PortfolioValuation> {
        {
            let mut book = self.books.entry(record.aggregate_id.clone()).or_default();
            if record.version <= book.version {
                debug!(
                    "skipping {} v{}: book at v{}",
                    record.aggregate_id, record.version, book.version
                );
            } else if record.version > book.version + 1 {
                warn!(
                    "book gap for {}: at v{}, saw v{}, catching up",
                    record.aggregate_id, book.version, record.version
                );
                let tail = self
                    .event_store
                    .read_from(&record.aggregate_id, book.version + 1)?;
                for stored in &tail {
                    self.apply_to_book(&mut book, stored)?;
                }
            } else {
                self.apply_to_book(&mut book, record)?;
            }
        }

        let valuation = self.valuation(&record.aggregate_id)?;
        self.notify(&valuation);
        Ok(valuation)
    }

    /// Applies one price tick. Duplicates and out-of-date observations change
    /// nothing; an accepted tick recomputes valuations for the symbol's
    /// holders only.
    pub fn handle_tick(&self, tick: PriceTick) -> Result<Vec<PortfolioValuation>> {
        let symbol = tick.symbol.clone();
        if !self.prices.apply(tick) {
            return Ok(Vec::new());
        }

        let holder_ids: Vec<PortfolioId> = match self.holders.get(&symbol) {
            Some(holders) => holders.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };

        let mut valuations = Vec::with_capacity(holder_ids.len());
        for aggregate_id in holder_ids {
            let valuation = self.valuation(&aggregate_id)?;
            self.notify(&valuation);
            valuations.push(valuation);
        }
        Ok(valuations)
    }

    /// Current valuation of one portfolio from its book and the price cache.
    pub fn valuation(&self, aggregate_id: &PortfolioId) -> Result<PortfolioValuation> {
        let book = self.books.get(aggregate_id).ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "no valuation state for {aggregate_id}"
            )))
        })?;

        let as_of = Utc::now();
        let mut positions: Vec<PositionValuation> = Vec::with_capacity(book.positions.len());
        for position in book.positions.values() {
            positions.push(self.value_position(position, as_of));
        }
        positions.sort_by(|a, b| a.symbol.as_str().cmp(b.symbol.as_str()));

        let market_value = positions.iter().map(|p| p.market_value).sum();
        let cost_basis = positions.iter().map(|p| p.cost_basis).sum();
        let unrealized_pnl = positions.iter().map(|p| p.unrealized_pnl).sum();
        let stale_symbols: Vec<Symbol> = positions
            .iter()
            .filter(|p| p.is_stale)
            .map(|p| p.symbol.clone())
            .collect();

        Ok(PortfolioValuation {
            aggregate_id: aggregate_id.clone(),
            as_of,
            market_value,
            cost_basis,
            realized_pnl: book.realized_pnl,
            unrealized_pnl,
            dividend_income: book.dividend_income,
            positions,
            is_stale: !stale_symbols.is_empty(),
            stale_symbols,
        })
    }

    fn value_position(
        &self,
        position: &Position,
        as_of: chrono::DateTime<Utc>,
    ) -> PositionValuation {
        let cost_basis = position.cost_basis();
        let latest = self.prices.latest(&position.symbol);
        let (market_price, price_as_of) = match &latest {
            Some(tick) => (Some(tick.price), Some(tick.observed_at)),
            None => (None, None),
        };
        // No tick yet: carry the position at cost.
        let market_value = match market_price {
            Some(price) => position.quantity * price,
            None => cost_basis,
        };
        let is_stale = position.quantity > Decimal::ZERO
            && self
                .prices
                .is_stale(&position.symbol, as_of, self.config.staleness_window);

        PositionValuation {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            cost_basis,
            average_cost: position.average_cost(),
            market_price,
            price_as_of,
            market_value,
            unrealized_pnl: market_value - cost_basis,
            is_stale,
        }
    }

    /// Folds the stored tail into the aggregate's book.
    fn catch_up(&self, aggregate_id: &PortfolioId) -> Result<()> {
        let mut book = self.books.entry(aggregate_id.clone()).or_default();
        let tail = self.event_store.read_from(aggregate_id, book.version + 1)?;
        for record in &tail {
            self.apply_to_book(&mut book, record)?;
        }
        Ok(())
    }

    fn apply_to_book(&self, book: &mut AggregateBook, record: &EventRecord) -> Result<()> {
        if record.version <= book.version {
            return Ok(());
        }
        if record.version != book.version + 1 {
            return Err(Error::Replay(ReplayError::VersionGap {
                aggregate_id: record.aggregate_id.to_string(),
                at: book.version,
                found: record.version,
            }));
        }

        match &record.payload {
            PortfolioEvent::PortfolioOpened { .. }
            | PortfolioEvent::PortfolioRenamed { .. }
            | PortfolioEvent::PortfolioClosed {} => {}

            PortfolioEvent::PositionOpened { symbol } => {
                book.positions
                    .insert(symbol.clone(), Position::new(symbol.clone(), record.occurred_at));
                self.holders
                    .entry(symbol.clone())
                    .or_default()
                    .insert(record.aggregate_id.clone());
            }

            PortfolioEvent::SharesBought {
                symbol,
                quantity,
                unit_price,
                lot_id,
            } => {
                let position = self.position_mut(book, symbol, record)?;
                position.add_lot(lot_id.clone(), *quantity, *unit_price, record.occurred_at);
            }

            PortfolioEvent::SharesSold {
                symbol,
                quantity,
                unit_price,
            } => {
                let position = self.position_mut(book, symbol, record)?;
                let consumed = position.consume_fifo(*quantity).map_err(|err| {
                    Error::Replay(ReplayError::Integrity {
                        aggregate_id: record.aggregate_id.to_string(),
                        version: record.version,
                        reason: err.to_string(),
                    })
                })?;
                book.realized_pnl += consumed
                    .iter()
                    .map(|slice| slice.realized_pnl(*unit_price))
                    .sum::<Decimal>();
            }

            PortfolioEvent::DividendReceived { amount, .. } => {
                book.dividend_income += *amount;
            }

            PortfolioEvent::CorporateActionApplied { symbol, kind, .. } => {
                let position = self.position_mut(book, symbol, record)?;
                match kind {
                    CorporateActionKind::SplitForward { ratio } => {
                        position.apply_split(*ratio);
                    }
                }
            }
        }

        book.version = record.version;
        Ok(())
    }

    fn position_mut<'b>(
        &self,
        book: &'b mut AggregateBook,
        symbol: &Symbol,
        record: &EventRecord,
    ) -> Result<&'b mut Position> {
        book.positions.get_mut(symbol).ok_or_else(|| {
            Error::Replay(ReplayError::Integrity {
                aggregate_id: record.aggregate_id.to_string(),
                version: record.version,
                reason: format!("event for unopened position '{symbol}'"),
            })
        })
    }

    fn notify(&self, valuation: &PortfolioValuation) {
        let Ok(observers) = self.observers.read() else {
            warn!("observer list unavailable, skipping valuation fan-out");
            return;
        };
        for observer in observers.iter() {
            observer.on_valuation(valuation);
        }
    }
}
