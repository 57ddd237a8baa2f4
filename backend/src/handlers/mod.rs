//! HTTP handlers for the Warehouse Management Platform

pub mod auth;
pub mod dispatches;
pub mod health;
pub mod inventory;
pub mod orders;
pub mod reporting;
pub mod users;

pub use auth::{login, logout, refresh, setup, setup_status};
pub use dispatches::{
    create_dispatch, delete_photo, edit_dispatch, get_dispatch, list_dispatches, list_photos,
    upload_photo,
};
pub use health::health_check;
pub use inventory::{
    create_ingreso, delete_product, delete_product_references, edit_ingreso, get_ingreso,
    list_ingresos, list_inventory, merge_products, product_references, product_usage,
    suggest_products, update_product,
};
pub use orders::{
    create_order, delete_order, edit_order, get_order, get_order_by_number, list_orders,
};
pub use reporting::{dispatch_pdf, export_logs, get_dashboard, list_logs, order_pdf};
pub use users::{
    change_password, create_user, delete_user, get_profile, list_users, reset_password,
    set_theme, update_profile, update_user,
};
