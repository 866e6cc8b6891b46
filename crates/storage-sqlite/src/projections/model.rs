//! Database models for the projection view tables.

use diesel::prelude::*;

use ledgerfolio_core::errors::{DatabaseError, Error};
use ledgerfolio_core::events::{PortfolioId, Symbol};
use ledgerfolio_core::projections::{HoldingRow, LedgerEntryKind, LedgerEntryRow};
use ledgerfolio_core::Result;

use crate::utils::{decode_decimal, decode_timestamp, encode_decimal, encode_timestamp};

/// Database model for one row of the current-positions view.
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::holdings_view)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HoldingRowDB {
    pub aggregate_id: String,
    pub symbol: String,
    pub quantity: String,
    pub cost_basis: String,
    pub average_cost: String,
    pub opened_at: String,
    pub updated_at: String,
}

impl From<&HoldingRow> for HoldingRowDB {
    fn from(row: &HoldingRow) -> Self {
        Self {
            aggregate_id: row.aggregate_id.to_string(),
            symbol: row.symbol.to_string(),
            quantity: encode_decimal(row.quantity),
            cost_basis: encode_decimal(row.cost_basis),
            average_cost: encode_decimal(row.average_cost),
            opened_at: encode_timestamp(&row.opened_at),
            updated_at: encode_timestamp(&row.updated_at),
        }
    }
}

impl HoldingRowDB {
    pub fn into_row(self) -> Result<HoldingRow> {
        Ok(HoldingRow {
            quantity: decode_decimal("quantity", &self.quantity)?,
            cost_basis: decode_decimal("cost_basis", &self.cost_basis)?,
            average_cost: decode_decimal("average_cost", &self.average_cost)?,
            opened_at: decode_timestamp("opened_at", &self.opened_at)?,
            updated_at: decode_timestamp("updated_at", &self.updated_at)?,
            aggregate_id: PortfolioId::from(self.aggregate_id),
            symbol: Symbol::from(self.symbol),
        })
    }
}

/// Database model for one row of the transaction-history view.
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::ledger_view)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LedgerEntryRowDB {
    pub event_id: String,
    pub aggregate_id: String,
    pub aggregate_version: i64,
    pub kind: String,
    pub symbol: Option<String>,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub amount: Option<String>,
    pub occurred_at: String,
    pub recorded_at: String,
}

impl From<&LedgerEntryRow> for LedgerEntryRowDB {
    fn from(row: &LedgerEntryRow) -> Self {
        Self {
            event_id: row.event_id.clone(),
            aggregate_id: row.aggregate_id.to_string(),
            aggregate_version: row.version as i64,
            kind: row.kind.as_str().to_string(),
            symbol: row.symbol.as_ref().map(|s| s.to_string()),
            quantity: row.quantity.map(encode_decimal),
            unit_price: row.unit_price.map(encode_decimal),
            amount: row.amount.map(encode_decimal),
            occurred_at: encode_timestamp(&row.occurred_at),
            recorded_at: encode_timestamp(&row.recorded_at),
        }
    }
}

impl LedgerEntryRowDB {
    pub fn into_row(self) -> Result<LedgerEntryRow> {
        let kind = LedgerEntryKind::parse(&self.kind).ok_or_else(|| {
            Error::Database(DatabaseError::Serialization(format!(
                "unknown ledger entry kind '{}'",
                self.kind
            )))
        })?;

        Ok(LedgerEntryRow {
            kind,
            version: self.aggregate_version as u64,
            quantity: self
                .quantity
                .as_deref()
                .map(|raw| decode_decimal("quantity", raw))
                .transpose()?,
            unit_price: self
                .unit_price
                .as_deref()
                .map(|raw| decode_decimal("unit_price", raw))
                .transpose()?,
            amount: self
                .amount
                .as_deref()
                .map(|raw| decode_decimal("amount", raw))
                .transpose()?,
            occurred_at: decode_timestamp("occurred_at", &self.occurred_at)?,
            recorded_at: decode_timestamp("recorded_at", &self.recorded_at)?,
            event_id: self.event_id,
            aggregate_id: PortfolioId::from(self.aggregate_id),
            symbol: self.symbol.map(Symbol::from),
        })
    }
}

/// Database model for one projection checkpoint.
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::projection_checkpoints)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProjectionCheckpointDB {
    pub aggregate_id: String,
    pub last_version: i64,
    pub updated_at: String,
}
