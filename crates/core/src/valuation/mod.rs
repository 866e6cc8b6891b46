//! Valuation and cost-basis engine.

mod valuation_model;
mod valuation_service;

pub use valuation_model::*;
pub use valuation_service::*;
