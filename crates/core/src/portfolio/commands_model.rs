//! Command types: requested mutations against a single portfolio.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{PortfolioId, Symbol};

/// A requested mutation. Commands are validated against current aggregate
/// state and either rejected whole or recorded as one or more events.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortfolioCommand {
    OpenPortfolio {
        owner_id: String,
        name: String,
    },
    OpenPosition {
        symbol: Symbol,
    },
    BuyShares {
        symbol: Symbol,
        quantity: Decimal,
        price: Decimal,
        executed_at: DateTime<Utc>,
    },
    SellShares {
        symbol: Symbol,
        quantity: Decimal,
        price: Decimal,
        executed_at: DateTime<Utc>,
    },
    ReceiveDividend {
        symbol: Symbol,
        amount: Decimal,
        pay_date: NaiveDate,
    },
    ApplySplit {
        symbol: Symbol,
        ratio: Decimal,
        effective_at: DateTime<Utc>,
    },
    RenamePortfolio {
        name: String,
    },
    ClosePortfolio,
}

impl PortfolioCommand {
    /// Stable tag for log context.
    pub fn kind(&self) -> &'static str {
        match self {
            PortfolioCommand::OpenPortfolio { .. } => "open_portfolio",
            PortfolioCommand::OpenPosition { .. } => "open_position",
            PortfolioCommand::BuyShares { .. } => "buy_shares",
            PortfolioCommand::SellShares { .. } => "sell_shares",
            PortfolioCommand::ReceiveDividend { .. } => "receive_dividend",
            PortfolioCommand::ApplySplit { .. } => "apply_split",
            PortfolioCommand::RenamePortfolio { .. } => "rename_portfolio",
            PortfolioCommand::ClosePortfolio => "close_portfolio",
        }
    }
}

/// A command addressed to one aggregate.
///
/// The envelope's `command_id` is stamped onto every produced event as its
/// `causation_id`, linking recorded history back to the request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub command_id: String,
    pub aggregate_id: PortfolioId,
    pub command: PortfolioCommand,
}

impl CommandEnvelope {
    pub fn new(aggregate_id: impl Into<PortfolioId>, command: PortfolioCommand) -> Self {
        Self {
            command_id: Uuid::new_v4().to_string(),
            aggregate_id: aggregate_id.into(),
            command,
        }
    }
}

/// Outcome of a successfully handled command.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandReceipt {
    pub aggregate_id: PortfolioId,
    /// Stream version after the append.
    pub new_version: u64,
    /// Ids of the recorded events, in stream order.
    pub event_ids: Vec<String>,
}
