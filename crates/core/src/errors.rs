//! Core error types for the ledger engine.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use rust_decimal::Decimal;
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the ledger engine.
///
/// Database-specific errors are wrapped in string form to keep this type
/// database-agnostic.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Append conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Command rejected: {0}")]
    Command(#[from] CommandError),

    #[error("Replay failed: {0}")]
    Replay(#[from] ReplayError),

    #[error("Price feed error: {0}")]
    PriceFeed(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Optimistic concurrency failure on event append.
///
/// Carries enough context for the caller to reload the aggregate,
/// re-validate, and retry against the current version.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("aggregate {aggregate_id} is at version {actual}, append expected {expected}")]
pub struct ConflictError {
    pub aggregate_id: String,
    pub expected: u64,
    pub actual: u64,
}

/// Domain rule violations that reject a command before anything is appended.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Portfolio '{0}' does not exist")]
    PortfolioNotFound(String),

    #[error("Portfolio '{0}' already exists")]
    PortfolioExists(String),

    #[error("Portfolio '{0}' is closed")]
    PortfolioClosed(String),

    #[error("Position for '{0}' is already open")]
    PositionExists(String),

    #[error("No open position for '{0}'")]
    PositionNotFound(String),

    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("Price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("Split ratio must be positive, got {0}")]
    NonPositiveRatio(Decimal),

    #[error("Cannot sell {requested} of '{symbol}', only {held} held")]
    InsufficientShares {
        symbol: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error("Portfolio name must not be empty")]
    EmptyName,
}

/// Failures while folding recorded events back into aggregate state.
///
/// These indicate an incompatible or corrupted stream. Reconstruction of the
/// affected aggregate halts; other aggregates are unaffected.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Unknown event type '{event_type}' for {aggregate_id} v{version}")]
    UnknownEventType {
        aggregate_id: String,
        version: u64,
        event_type: String,
    },

    #[error("Undecodable payload for {aggregate_id} v{version}: {source}")]
    PayloadDecode {
        aggregate_id: String,
        version: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Payload schema v{found} for {aggregate_id} v{version} is newer than supported v{supported}")]
    UnsupportedSchema {
        aggregate_id: String,
        version: u64,
        found: u16,
        supported: u16,
    },

    #[error("Event {aggregate_id} v{found} cannot apply to state at v{at}")]
    VersionGap {
        aggregate_id: String,
        at: u64,
        found: u64,
    },

    #[error("Integrity violation at {aggregate_id} v{version}: {reason}")]
    Integrity {
        aggregate_id: String,
        version: u64,
        reason: String,
    },
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g., duplicate key).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored payload could not be encoded or decoded.
    #[error("Stored payload could not be encoded or decoded: {0}")]
    Serialization(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

// === From implementations for common error types ===

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
