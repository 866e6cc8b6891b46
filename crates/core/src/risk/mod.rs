//! Risk and performance analytics engine.

mod returns_window;
mod risk_model;
mod risk_service;

pub use returns_window::*;
pub use risk_model::*;
pub use risk_service::*;
