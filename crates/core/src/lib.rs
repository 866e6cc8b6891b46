//! Ledgerfolio Core - Event-sourced portfolio ledger with analytics.
//!
//! This crate contains the whole engine: the write side (portfolio
//! aggregate, event store, snapshots), the consumers behind it
//! (projections, valuation, risk), and the query facade. It is
//! database-agnostic and defines traits that are implemented by the
//! `storage-sqlite` crate.

pub mod constants;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod events;
pub mod portfolio;
pub mod pricing;
pub mod projections;
pub mod queries;
pub mod risk;
pub mod valuation;

// Re-export common types from the event and portfolio modules
pub use events::*;
pub use portfolio::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
