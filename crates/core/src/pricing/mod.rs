//! Price feed contract and latest-price cache.

mod price_cache;
mod pricing_model;
mod pricing_traits;

pub use price_cache::*;
pub use pricing_model::*;
pub use pricing_traits::*;
