//! Event stream types.
//!
//! Every change to a portfolio is recorded as an immutable fact in an
//! append-only, per-aggregate stream. `PortfolioEvent` is the closed set of
//! facts; `EventRecord` is the stored envelope around one of them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::EVENT_SCHEMA_VERSION;

// =============================================================================
// PortfolioId
// =============================================================================

/// Aggregate identity - one per portfolio event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct PortfolioId(pub String);

impl PortfolioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PortfolioId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PortfolioId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for PortfolioId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// Instrument symbol as reported by the price feed.
///
/// Examples: "AAPL", "MSFT", "SPY"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PortfolioEvent
// =============================================================================

/// Kinds of corporate action the ledger records.
///
/// Actions apply forward from their stream position; they never restate
/// earlier history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CorporateActionKind {
    /// Share split: `ratio` new shares replace each old share.
    /// A ratio between 0 and 1 expresses a reverse split.
    SplitForward { ratio: Decimal },
}

/// The closed set of facts recorded in a portfolio stream.
///
/// Events are immutable once appended. Corrections are expressed as new
/// compensating events, never by rewriting history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortfolioEvent {
    /// A new, empty portfolio was opened for an owner.
    PortfolioOpened { owner_id: String, name: String },

    /// A position was opened for a symbol not previously held.
    PositionOpened { symbol: Symbol },

    /// Shares were bought, creating the tax lot `lot_id`.
    SharesBought {
        symbol: Symbol,
        quantity: Decimal,
        unit_price: Decimal,
        lot_id: String,
    },

    /// Shares were sold. Tax lots are consumed oldest-first on replay.
    SharesSold {
        symbol: Symbol,
        quantity: Decimal,
        unit_price: Decimal,
    },

    /// A cash dividend was received for a held symbol.
    DividendReceived {
        symbol: Symbol,
        amount: Decimal,
        pay_date: NaiveDate,
    },

    /// A corporate action was applied to a held symbol.
    CorporateActionApplied {
        symbol: Symbol,
        kind: CorporateActionKind,
        effective_at: DateTime<Utc>,
    },

    /// The portfolio was renamed.
    PortfolioRenamed { name: String },

    /// The portfolio was closed. Terminal: no further commands are accepted.
    PortfolioClosed {},
}

impl PortfolioEvent {
    /// Stable type tag, matching the serialized `type` field. Used for
    /// ledger rows and log context.
    pub fn event_type(&self) -> &'static str {
        match self {
            PortfolioEvent::PortfolioOpened { .. } => "portfolio_opened",
            PortfolioEvent::PositionOpened { .. } => "position_opened",
            PortfolioEvent::SharesBought { .. } => "shares_bought",
            PortfolioEvent::SharesSold { .. } => "shares_sold",
            PortfolioEvent::DividendReceived { .. } => "dividend_received",
            PortfolioEvent::CorporateActionApplied { .. } => "corporate_action_applied",
            PortfolioEvent::PortfolioRenamed { .. } => "portfolio_renamed",
            PortfolioEvent::PortfolioClosed {} => "portfolio_closed",
        }
    }

    /// The symbol this event concerns, if any.
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            PortfolioEvent::PositionOpened { symbol }
            | PortfolioEvent::SharesBought { symbol, .. }
            | PortfolioEvent::SharesSold { symbol, .. }
            | PortfolioEvent::DividendReceived { symbol, .. }
            | PortfolioEvent::CorporateActionApplied { symbol, .. } => Some(symbol),
            PortfolioEvent::PortfolioOpened { .. }
            | PortfolioEvent::PortfolioRenamed { .. }
            | PortfolioEvent::PortfolioClosed {} => None,
        }
    }
}

// =============================================================================
// NewEvent
// =============================================================================

/// A fact produced by a command, not yet appended to a stream.
///
/// The store assigns the stream position and `recorded_at` on append.
#[derive(Clone, Debug, PartialEq)]
pub struct NewEvent {
    pub event_id: String,
    pub payload: PortfolioEvent,
    /// When the fact happened in the world (trade execution, pay date).
    pub occurred_at: DateTime<Utc>,
    /// Id of the command that produced this event.
    pub causation_id: Option<String>,
}

impl NewEvent {
    pub fn new(payload: PortfolioEvent, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            payload,
            occurred_at,
            causation_id: None,
        }
    }

    pub fn caused_by(mut self, command_id: impl Into<String>) -> Self {
        self.causation_id = Some(command_id.into());
        self
    }
}

// =============================================================================
// EventRecord
// =============================================================================

/// The stored envelope around one recorded event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: String,
    pub aggregate_id: PortfolioId,
    /// Position in the aggregate's stream. Starts at 1, no gaps.
    pub version: u64,
    pub payload: PortfolioEvent,
    pub schema_version: u16,
    /// When the fact happened in the world.
    pub occurred_at: DateTime<Utc>,
    /// When the store accepted the append.
    pub recorded_at: DateTime<Utc>,
    pub causation_id: Option<String>,
}

impl EventRecord {
    /// Seals a pending event at a concrete stream position.
    pub fn seal(
        aggregate_id: &PortfolioId,
        version: u64,
        event: NewEvent,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event.event_id,
            aggregate_id: aggregate_id.clone(),
            version,
            payload: event.payload,
            schema_version: EVENT_SCHEMA_VERSION,
            occurred_at: event.occurred_at,
            recorded_at,
            causation_id: event.causation_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}
