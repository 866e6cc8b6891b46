//! Command handling: validate, decide, append, publish.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::{CommandError, Error, Result};
use crate::events::{
    CommittedEventSink, CorporateActionKind, EventRecord, EventStoreTrait, NewEvent,
    PortfolioEvent, PortfolioId,
};

use super::snapshot::SnapshotStoreTrait;
use super::{reducer, CommandEnvelope, CommandReceipt, Portfolio, PortfolioCommand};

/// Validates `command` against current state and produces the events to
/// append, in order. Rejections name the specific rule violated and leave
/// no trace in the stream.
pub fn decide(
    state: &Portfolio,
    command: &PortfolioCommand,
    now: DateTime<Utc>,
) -> Result<Vec<NewEvent>> {
    match command {
        PortfolioCommand::OpenPortfolio { owner_id, name } => {
            if state.exists() {
                return Err(CommandError::PortfolioExists(state.aggregate_id.to_string()).into());
            }
            if name.trim().is_empty() {
                return Err(CommandError::EmptyName.into());
            }
            Ok(vec![NewEvent::new(
                PortfolioEvent::PortfolioOpened {
                    owner_id: owner_id.clone(),
                    name: name.clone(),
                },
                now,
            )])
        }

        // Every other command requires a live portfolio.
        _ if !state.exists() => {
            Err(CommandError::PortfolioNotFound(state.aggregate_id.to_string()).into())
        }
        _ if state.is_closed() => {
            Err(CommandError::PortfolioClosed(state.aggregate_id.to_string()).into())
        }

        PortfolioCommand::OpenPosition { symbol } => {
            if state.positions.contains_key(symbol) {
                return Err(CommandError::PositionExists(symbol.to_string()).into());
            }
            Ok(vec![NewEvent::new(
                PortfolioEvent::PositionOpened {
                    symbol: symbol.clone(),
                },
                now,
            )])
        }

        PortfolioCommand::BuyShares {
            symbol,
            quantity,
            price,
            executed_at,
        } => {
            if *quantity <= Decimal::ZERO {
                return Err(CommandError::NonPositiveQuantity(*quantity).into());
            }
            if *price <= Decimal::ZERO {
                return Err(CommandError::NonPositivePrice(*price).into());
            }

            let mut events = Vec::new();
            // First trade in a symbol opens the position in the same append.
            if !state.positions.contains_key(symbol) {
                events.push(NewEvent::new(
                    PortfolioEvent::PositionOpened {
                        symbol: symbol.clone(),
                    },
                    *executed_at,
                ));
            }
            events.push(NewEvent::new(
                PortfolioEvent::SharesBought {
                    symbol: symbol.clone(),
                    quantity: *quantity,
                    unit_price: *price,
                    lot_id: Uuid::new_v4().to_string(),
                },
                *executed_at,
            ));
            Ok(events)
        }

        PortfolioCommand::SellShares {
            symbol,
            quantity,
            price,
            executed_at,
        } => {
            if *quantity <= Decimal::ZERO {
                return Err(CommandError::NonPositiveQuantity(*quantity).into());
            }
            if *price <= Decimal::ZERO {
                return Err(CommandError::NonPositivePrice(*price).into());
            }
            let held = state.held_quantity(symbol);
            if held < *quantity {
                return Err(CommandError::InsufficientShares {
                    symbol: symbol.to_string(),
                    requested: *quantity,
                    held,
                }
                .into());
            }
            Ok(vec![NewEvent::new(
                PortfolioEvent::SharesSold {
                    symbol: symbol.clone(),
                    quantity: *quantity,
                    unit_price: *price,
                },
                *executed_at,
            )])
        }

        PortfolioCommand::ReceiveDividend {
            symbol,
            amount,
            pay_date,
        } => {
            if *amount <= Decimal::ZERO {
                return Err(CommandError::NonPositiveAmount(*amount).into());
            }
            if !state.positions.contains_key(symbol) {
                return Err(CommandError::PositionNotFound(symbol.to_string()).into());
            }
            Ok(vec![NewEvent::new(
                PortfolioEvent::DividendReceived {
                    symbol: symbol.clone(),
                    amount: *amount,
                    pay_date: *pay_date,
                },
                pay_date.and_time(NaiveTime::MIN).and_utc(),
            )])
        }

        PortfolioCommand::ApplySplit {
            symbol,
            ratio,
            effective_at,
        } => {
            if *ratio <= Decimal::ZERO {
                return Err(CommandError::NonPositiveRatio(*ratio).into());
            }
            if !state.positions.contains_key(symbol) {
                return Err(CommandError::PositionNotFound(symbol.to_string()).into());
            }
            Ok(vec![NewEvent::new(
                PortfolioEvent::CorporateActionApplied {
                    symbol: symbol.clone(),
                    kind: CorporateActionKind::SplitForward { ratio: *ratio },
                    effective_at: *effective_at,
                },
                *effective_at,
            )])
        }

        PortfolioCommand::RenamePortfolio { name } => {
            if name.trim().is_empty() {
                return Err(CommandError::EmptyName.into());
            }
            Ok(vec![NewEvent::new(
                PortfolioEvent::PortfolioRenamed { name: name.clone() },
                now,
            )])
        }

        PortfolioCommand::ClosePortfolio => Ok(vec![NewEvent::new(
            PortfolioEvent::PortfolioClosed {},
            now,
        )]),
    }
}

/// Retry policy for optimistic append conflicts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(20),
        }
    }
}

impl RetryPolicy {
    /// Doubling backoff: base, 2x base, 4x base, ...
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Handles commands against portfolio streams.
///
/// One instance serves all aggregates; per-aggregate serialization comes
/// from the store's compare-and-append, not from locks held here.
pub struct PortfolioCommandService {
    event_store: Arc<dyn EventStoreTrait>,
    snapshot_store: Arc<dyn SnapshotStoreTrait>,
    sink: Arc<dyn CommittedEventSink>,
    retry: RetryPolicy,
}

impl PortfolioCommandService {
    pub fn new(
        event_store: Arc<dyn EventStoreTrait>,
        snapshot_store: Arc<dyn SnapshotStoreTrait>,
        sink: Arc<dyn CommittedEventSink>,
    ) -> Self {
        Self {
            event_store,
            snapshot_store,
            sink,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Handles one command end to end: load state, validate, append,
    /// publish the committed records.
    ///
    /// On an append conflict the aggregate is reloaded and the command
    /// re-validated against the winner's events, up to the policy's attempt
    /// budget. Validation rejections are never retried.
    pub async fn execute(&self, envelope: CommandEnvelope) -> Result<CommandReceipt> {
        debug!(
            "handling {} for {}",
            envelope.command.kind(),
            envelope.aggregate_id
        );

        let mut attempt = 1;
        loop {
            match self.try_execute(&envelope).await {
                Err(Error::Conflict(conflict)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "append conflict on {} (attempt {}/{}), retrying in {:?}: {}",
                        envelope.aggregate_id, attempt, self.retry.max_attempts, delay, conflict
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn try_execute(&self, envelope: &CommandEnvelope) -> Result<CommandReceipt> {
        let state = self.load_aggregate(&envelope.aggregate_id)?;
        let expected = state.version;

        let events: Vec<NewEvent> = decide(&state, &envelope.command, Utc::now())?
            .into_iter()
            .map(|event| event.caused_by(envelope.command_id.clone()))
            .collect();

        let new_version = self
            .event_store
            .append(&envelope.aggregate_id, expected, events)
            .await?;

        // Read the sealed records back so subscribers see store-stamped
        // envelopes. Anything past new_version belongs to a later append.
        let records: Vec<EventRecord> = self
            .event_store
            .read_from(&envelope.aggregate_id, expected + 1)?
            .into_iter()
            .filter(|record| record.version <= new_version)
            .collect();
        self.sink.publish_batch(&records);

        debug!(
            "{} advanced {} to v{}",
            envelope.command.kind(),
            envelope.aggregate_id,
            new_version
        );

        Ok(CommandReceipt {
            aggregate_id: envelope.aggregate_id.clone(),
            new_version,
            event_ids: records.into_iter().map(|r| r.event_id).collect(),
        })
    }

    /// Rebuilds current state from the latest snapshot plus the stream
    /// tail, or from genesis when no usable snapshot exists.
    pub fn load_aggregate(&self, aggregate_id: &PortfolioId) -> Result<Portfolio> {
        load_portfolio(
            self.event_store.as_ref(),
            self.snapshot_store.as_ref(),
            aggregate_id,
        )
    }
}

/// Rebuilds an aggregate: latest snapshot plus the stream tail, or a full
/// replay from genesis when no snapshot exists.
///
/// A snapshot that fails to load is treated as absent. Snapshots are derived
/// data; a broken one must never block reads or writes.
pub fn load_portfolio(
    event_store: &dyn EventStoreTrait,
    snapshot_store: &dyn SnapshotStoreTrait,
    aggregate_id: &PortfolioId,
) -> Result<Portfolio> {
    let snapshot = match snapshot_store.load_latest(aggregate_id) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!("snapshot load failed for {aggregate_id}, replaying from genesis: {err}");
            None
        }
    };

    let (seed, from_version) = match snapshot {
        Some(snapshot) => {
            let from = snapshot.version + 1;
            (snapshot.state, from)
        }
        None => (Portfolio::seed(aggregate_id.clone()), 1),
    };

    let tail = event_store.read_from(aggregate_id, from_version)?;
    reducer::replay(seed, &tail)
}
