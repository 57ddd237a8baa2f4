//! Business logic services for the Warehouse Management Platform

pub mod audit;
pub mod auth;
pub mod catalog;
pub mod dashboard;
pub mod dispatch;
pub mod ingreso;
pub mod order;
pub mod product;
pub mod reporting;
pub mod user;

pub use audit::LogService;
pub use auth::AuthService;
pub use dashboard::DashboardService;
pub use dispatch::DispatchService;
pub use ingreso::IngresoService;
pub use order::OrderService;
pub use product::ProductService;
pub use reporting::ReportingService;
pub use user::UserService;
