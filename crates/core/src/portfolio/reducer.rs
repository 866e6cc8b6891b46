//! Deterministic event fold.
//!
//! Aggregate state is never stored; it is always the result of folding the
//! stream's events in version order over a seed. The fold is pure: the same
//! events produce the same state, byte for byte, which is what makes
//! snapshots a pure replay-cost optimization.

use crate::constants::EVENT_SCHEMA_VERSION;
use crate::errors::{Error, ReplayError, Result};
use crate::events::{CorporateActionKind, EventRecord, PortfolioEvent, PortfolioId};

use super::{Portfolio, PortfolioStatus, Position};

/// Folds `records` onto `state` in order.
pub fn replay(state: Portfolio, records: &[EventRecord]) -> Result<Portfolio> {
    let mut state = state;
    for record in records {
        apply(&mut state, record)?;
    }
    Ok(state)
}

/// Applies one recorded event to the aggregate.
///
/// Expects `record.version == state.version + 1`. A gap or an event from a
/// foreign stream means the caller handed over broken history, and the fold
/// halts rather than producing silently wrong state.
pub fn apply(state: &mut Portfolio, record: &EventRecord) -> Result<()> {
    if record.aggregate_id != state.aggregate_id {
        return Err(integrity(
            &record.aggregate_id,
            record.version,
            format!("event for foreign aggregate applied to {}", state.aggregate_id),
        ));
    }
    if record.version != state.version + 1 {
        return Err(Error::Replay(ReplayError::VersionGap {
            aggregate_id: state.aggregate_id.to_string(),
            at: state.version,
            found: record.version,
        }));
    }
    if record.schema_version > EVENT_SCHEMA_VERSION {
        return Err(Error::Replay(ReplayError::UnsupportedSchema {
            aggregate_id: state.aggregate_id.to_string(),
            version: record.version,
            found: record.schema_version,
            supported: EVENT_SCHEMA_VERSION,
        }));
    }

    if !matches!(record.payload, PortfolioEvent::PortfolioOpened { .. }) {
        if !state.exists() {
            return Err(integrity(
                &record.aggregate_id,
                record.version,
                "event recorded before portfolio genesis",
            ));
        }
        if state.is_closed() {
            return Err(integrity(
                &record.aggregate_id,
                record.version,
                "event recorded after portfolio close",
            ));
        }
    }

    match &record.payload {
        PortfolioEvent::PortfolioOpened { owner_id, name } => {
            if state.exists() {
                return Err(integrity(
                    &record.aggregate_id,
                    record.version,
                    "portfolio opened twice",
                ));
            }
            state.owner_id = owner_id.clone();
            state.name = name.clone();
            state.status = PortfolioStatus::Active;
        }

        PortfolioEvent::PositionOpened { symbol } => {
            if state.positions.contains_key(symbol) {
                return Err(integrity(
                    &record.aggregate_id,
                    record.version,
                    format!("position for '{symbol}' opened twice"),
                ));
            }
            state
                .positions
                .insert(symbol.clone(), Position::new(symbol.clone(), record.occurred_at));
        }

        PortfolioEvent::SharesBought {
            symbol,
            quantity,
            unit_price,
            lot_id,
        } => {
            let Some(position) = state.positions.get_mut(symbol) else {
                return Err(integrity(
                    &record.aggregate_id,
                    record.version,
                    format!("buy for unopened position '{symbol}'"),
                ));
            };
            position.add_lot(lot_id.clone(), *quantity, *unit_price, record.occurred_at);
        }

        PortfolioEvent::SharesSold {
            symbol, quantity, ..
        } => {
            let Some(position) = state.positions.get_mut(symbol) else {
                return Err(integrity(
                    &record.aggregate_id,
                    record.version,
                    format!("sale for unopened position '{symbol}'"),
                ));
            };
            position
                .consume_fifo(*quantity)
                .map_err(|err| integrity(&record.aggregate_id, record.version, err.to_string()))?;
        }

        PortfolioEvent::DividendReceived { symbol, .. } => {
            // Dividends do not change lots; the valuation side accumulates
            // the cash income. Replay only verifies the stream is coherent.
            if !state.positions.contains_key(symbol) {
                return Err(integrity(
                    &record.aggregate_id,
                    record.version,
                    format!("dividend for unopened position '{symbol}'"),
                ));
            }
        }

        PortfolioEvent::CorporateActionApplied { symbol, kind, .. } => {
            let Some(position) = state.positions.get_mut(symbol) else {
                return Err(integrity(
                    &record.aggregate_id,
                    record.version,
                    format!("corporate action for unopened position '{symbol}'"),
                ));
            };
            match kind {
                CorporateActionKind::SplitForward { ratio } => position.apply_split(*ratio),
            }
        }

        PortfolioEvent::PortfolioRenamed { name } => {
            state.name = name.clone();
        }

        PortfolioEvent::PortfolioClosed {} => {
            state.status = PortfolioStatus::Closed;
        }
    }

    state.version = record.version;
    Ok(())
}

fn integrity(aggregate_id: &PortfolioId, version: u64, reason: impl Into<String>) -> Error {
    Error::Replay(ReplayError::Integrity {
        aggregate_id: aggregate_id.to_string(),
        version,
        reason: reason.into(),
    })
}
