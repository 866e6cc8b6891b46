//! Portfolio aggregate: commands in, events out, state by replay.
//!
//! The write side of the engine. [`command_service`] validates commands
//! against replayed state and appends the resulting events; [`reducer`]
//! is the pure fold that turns a stream back into a [`Portfolio`];
//! [`snapshot`] caches fold results to bound replay cost.

pub mod command_service;
pub mod reducer;
pub mod snapshot;

mod commands_model;
mod portfolio_model;

pub use command_service::{decide, load_portfolio, PortfolioCommandService, RetryPolicy};
pub use commands_model::*;
pub use portfolio_model::*;

#[cfg(test)]
mod command_service_tests;
