//! Partitioned worker dispatch for engine consumers.

mod router;

pub use router::*;
