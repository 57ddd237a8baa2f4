//! Route definitions for the Warehouse Management Platform

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Room for multipart boundaries and the text fields around the photo
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let upload_limit = state.config.uploads.max_bytes + MULTIPART_OVERHEAD;

    let protected = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .nest("/users", user_routes())
        .nest("/profile", profile_routes())
        .route("/inventory", get(handlers::list_inventory))
        .nest("/products", product_routes())
        .nest("/ingresos", ingreso_routes())
        .nest("/dispatches", dispatch_routes(upload_limit))
        .nest("/orders", order_routes())
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/logs", get(handlers::list_logs))
        .route("/logs/export", get(handlers::export_logs))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // First-run setup (public, refuses once a user exists)
        .route("/setup", post(handlers::setup))
        .route("/setup/status", get(handlers::setup_status))
        // Auth routes (public)
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .merge(protected)
}

/// User administration (admin only)
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/:user_id",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        .route("/:user_id/reset-password", post(handlers::reset_password))
}

/// The caller's own account
fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_profile).put(handlers::update_profile))
        .route("/password", post(handlers::change_password))
        .route("/theme", post(handlers::set_theme))
}

/// Product maintenance
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/suggest", get(handlers::suggest_products))
        .route("/merge", post(handlers::merge_products))
        .route(
            "/:product_id",
            put(handlers::update_product).delete(handlers::delete_product),
        )
        .route("/:product_id/usage", get(handlers::product_usage))
        .route("/:product_id/references", get(handlers::product_references))
        .route(
            "/:product_id/references/delete",
            post(handlers::delete_product_references),
        )
}

/// Intake batches
fn ingreso_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_ingresos).post(handlers::create_ingreso))
        .route(
            "/:batch_id",
            get(handlers::get_ingreso).put(handlers::edit_ingreso),
        )
}

/// Dispatch batches, photos and reports
fn dispatch_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_dispatches).post(handlers::create_dispatch),
        )
        .route(
            "/:batch_id",
            get(handlers::get_dispatch).put(handlers::edit_dispatch),
        )
        .route(
            "/:batch_id/photos",
            get(handlers::list_photos)
                .post(handlers::upload_photo)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/:batch_id/photos/:photo_id",
            delete(handlers::delete_photo),
        )
        .route("/:batch_id/pdf", get(handlers::dispatch_pdf))
}

/// Purchase orders
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route("/by-number/:number", get(handlers::get_order_by_number))
        .route(
            "/:order_id",
            get(handlers::get_order)
                .put(handlers::edit_order)
                .delete(handlers::delete_order),
        )
        .route("/:order_id/pdf", get(handlers::order_pdf))
}
