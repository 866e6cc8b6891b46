//! Database model for rows in `events`.

use diesel::prelude::*;

use ledgerfolio_core::constants::EVENT_SCHEMA_VERSION;
use ledgerfolio_core::errors::{DatabaseError, Error, ReplayError};
use ledgerfolio_core::events::{EventRecord, PortfolioEvent, PortfolioId};
use ledgerfolio_core::Result;

use crate::utils::{decode_timestamp, encode_timestamp};

/// Event type tags the decoder accepts. Must match the serde tags of
/// `PortfolioEvent`.
const KNOWN_EVENT_TYPES: [&str; 8] = [
    "portfolio_opened",
    "position_opened",
    "shares_bought",
    "shares_sold",
    "dividend_received",
    "corporate_action_applied",
    "portfolio_renamed",
    "portfolio_closed",
];

/// Database model for one recorded event.
///
/// `event_type` denormalizes the payload's serde tag so rows can be
/// inspected and filtered without decoding the JSON.
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EventRecordDB {
    pub id: String,
    pub aggregate_id: String,
    pub aggregate_version: i64,
    pub event_type: String,
    pub payload: String,
    pub schema_version: i16,
    pub occurred_at: String,
    pub recorded_at: String,
    pub causation_id: Option<String>,
}

impl EventRecordDB {
    /// Encodes a sealed record for insertion.
    pub fn from_record(record: &EventRecord) -> Result<Self> {
        let payload = serde_json::to_string(&record.payload).map_err(|e| {
            Error::Database(DatabaseError::Serialization(format!(
                "event {} v{} payload: {e}",
                record.aggregate_id, record.version
            )))
        })?;

        Ok(Self {
            id: record.event_id.clone(),
            aggregate_id: record.aggregate_id.to_string(),
            aggregate_version: record.version as i64,
            event_type: record.event_type().to_string(),
            payload,
            schema_version: record.schema_version as i16,
            occurred_at: encode_timestamp(&record.occurred_at),
            recorded_at: encode_timestamp(&record.recorded_at),
            causation_id: record.causation_id.clone(),
        })
    }

    /// Decodes a stored row. A row that cannot be decoded is a hard error:
    /// replay halts for the aggregate instead of folding a guessed event.
    pub fn into_record(self) -> Result<EventRecord> {
        let version = self.aggregate_version as u64;

        if self.schema_version as u16 > EVENT_SCHEMA_VERSION {
            return Err(Error::Replay(ReplayError::UnsupportedSchema {
                aggregate_id: self.aggregate_id,
                version,
                found: self.schema_version as u16,
                supported: EVENT_SCHEMA_VERSION,
            }));
        }

        let payload: PortfolioEvent = match serde_json::from_str(&self.payload) {
            Ok(payload) => payload,
            Err(source) => {
                return Err(if KNOWN_EVENT_TYPES.contains(&self.event_type.as_str()) {
                    Error::Replay(ReplayError::PayloadDecode {
                        aggregate_id: self.aggregate_id,
                        version,
                        source,
                    })
                } else {
                    Error::Replay(ReplayError::UnknownEventType {
                        aggregate_id: self.aggregate_id,
                        version,
                        event_type: self.event_type,
                    })
                });
            }
        };

        Ok(EventRecord {
            event_id: self.id,
            aggregate_id: PortfolioId::from(self.aggregate_id),
            version,
            payload,
            schema_version: self.schema_version as u16,
            occurred_at: decode_timestamp("occurred_at", &self.occurred_at)?,
            recorded_at: decode_timestamp("recorded_at", &self.recorded_at)?,
            causation_id: self.causation_id,
        })
    }
}
