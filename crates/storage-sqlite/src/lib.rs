//! SQLite storage implementation for Ledgerfolio.
//!
//! This crate provides all database-related functionality using Diesel ORM
//! with SQLite. It implements the storage traits defined in
//! `ledgerfolio-core` and contains:
//! - Database connection pooling and the single-writer actor
//! - Diesel migrations
//! - The durable event store, snapshot store and projection read models
//! - Database-specific model types (with Diesel derives)
//!
//! # Architecture
//!
//! This crate is the only place where Diesel dependencies exist. The core
//! crate is database-agnostic and works with traits.
//!
//! ```text
//!          ledgerfolio-core (domain)
//!                    │
//!                    ▼
//!         storage-sqlite (this crate)
//!                    │
//!                    ▼
//!                SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;

mod utils;

// Repository implementations
pub mod events;
pub mod projections;
pub mod snapshots;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, get_db_path, init, run_migrations, spawn_writer, DbConnection,
    DbPool, WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

// Re-export repositories at the crate root
pub use events::SqliteEventStore;
pub use projections::{SqliteHoldingsReadModel, SqliteLedgerReadModel, SqliteProjectionCheckpoints};
pub use snapshots::SqliteSnapshotStore;

// Re-export from ledgerfolio-core for convenience
pub use ledgerfolio_core::errors::{DatabaseError, Error, Result};
