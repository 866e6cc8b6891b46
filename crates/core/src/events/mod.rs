//! Event stream module.
//!
//! Provides the append-only event model, the store contract, an in-memory
//! store, and the sink that fans committed records out to the read side.

mod events_model;
mod events_traits;
mod memory_store;
mod sink;

pub use events_model::*;
pub use events_traits::*;
pub use memory_store::*;
pub use sink::*;
