//! Query API over the read side.

mod query_service;

pub use query_service::*;
