//! Request models for the Warehouse Management Platform

mod dispatch;
mod inventory;
mod log;
mod order;
mod user;

pub use dispatch::*;
pub use inventory::*;
pub use log::*;
pub use order::*;
pub use user::*;
