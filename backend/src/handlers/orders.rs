//! HTTP handlers for purchase orders

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::order::{
    OrderCreated, OrderDeleted, OrderDetail, OrderEdited, OrderProgress, OrderService, OrderSummary,
};
use crate::AppState;
use shared::{CreateOrderInput, EditOrderInput};

/// List purchase orders with their status
pub async fn list_orders(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<OrderSummary>>> {
    let zone = state.config.display_zone();
    let service = OrderService::new(state.db);
    let orders = service.list_orders(zone).await?;
    Ok(Json(orders))
}

/// Create a purchase order
pub async fn create_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<OrderCreated>)> {
    let service = OrderService::new(state.db);
    let created = service.create_order(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Order detail with fulfillment progress and tagged dispatches
pub async fn get_order(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<OrderDetail>> {
    let zone = state.config.display_zone();
    let service = OrderService::new(state.db);
    let detail = service.get_detail(order_id, zone).await?;
    Ok(Json(detail))
}

/// Per-item progress by order number
pub async fn get_order_by_number(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(number): Path<String>,
) -> AppResult<Json<OrderProgress>> {
    let service = OrderService::new(state.db);
    let progress = service.progress_by_number(&number).await?;
    Ok(Json(progress))
}

/// Edit a purchase order
pub async fn edit_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<i64>,
    Json(input): Json<EditOrderInput>,
) -> AppResult<Json<OrderEdited>> {
    let service = OrderService::new(state.db);
    let edited = service
        .edit_order(current_user.0.user_id, order_id, input)
        .await?;
    Ok(Json(edited))
}

/// Delete a purchase order
pub async fn delete_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<OrderDeleted>> {
    let service = OrderService::new(state.db);
    let deleted = service.delete_order(current_user.0.user_id, order_id).await?;
    Ok(Json(deleted))
}
