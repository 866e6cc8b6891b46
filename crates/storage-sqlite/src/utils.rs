//! Text codecs shared by the SQLite repositories.
//!
//! Timestamps are stored as UTC RFC3339 with fixed microsecond precision so
//! that lexicographic order on the TEXT column matches chronological order
//! and range filters can run in SQL. Decimal columns in the view tables are
//! rounded to the engine precision before encoding; event payloads keep full
//! precision inside their JSON.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use ledgerfolio_core::constants::DECIMAL_PRECISION;
use ledgerfolio_core::errors::{DatabaseError, Error};
use ledgerfolio_core::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub(crate) fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| {
            Error::Database(DatabaseError::Serialization(format!(
                "bad {column} timestamp '{raw}': {e}"
            )))
        })
}

pub(crate) fn encode_decimal(value: Decimal) -> String {
    value.round_dp(DECIMAL_PRECISION).to_string()
}

pub(crate) fn decode_decimal(column: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| {
        Error::Database(DatabaseError::Serialization(format!(
            "bad {column} decimal '{raw}': {e}"
        )))
    })
}
