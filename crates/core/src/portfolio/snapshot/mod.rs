//! Aggregate snapshots - replay-cost optimization, never source of truth.

mod memory_store;
mod snapshot_model;
mod snapshot_service;
mod snapshot_traits;

pub use memory_store::*;
pub use snapshot_model::*;
pub use snapshot_service::*;
pub use snapshot_traits::*;
