//! Shared types and stock logic for the Warehouse Management Platform
//!
//! This crate contains the request models, the stock reconciliation planner
//! and the purchase-order fulfillment rules used by the backend and, through
//! WASM, by the browser forms.

pub mod fulfillment;
pub mod models;
pub mod stock;
pub mod text;
pub mod types;
pub mod validation;

pub use fulfillment::*;
pub use models::*;
pub use types::*;
pub use validation::*;
