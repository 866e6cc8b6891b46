//! Projection engine: committed events in, query-shaped read models out.

mod memory_read_model;
mod projections_model;
mod projections_traits;
mod projector;

pub use memory_read_model::*;
pub use projections_model::*;
pub use projections_traits::*;
pub use projector::*;

#[cfg(test)]
mod projector_tests;
