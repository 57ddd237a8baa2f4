//! HTTP handlers for products and intake batches

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::error::AppResult;
use crate::middleware::{AdminUser, CurrentUser};
use crate::services::catalog::{BatchEditSummary, Product};
use crate::services::ingreso::{IngresoBatch, IngresoCreated, IngresoService};
use crate::services::product::{
    DeletedReferences, MergeOutcome, ProductReferences, ProductService, ProductUsageReport,
};
use crate::AppState;
use shared::{
    CreateIngresoInput, DeleteReferencesInput, EditIngresoInput, IngresoHistoryQuery,
    MergeProductsInput, SuggestQuery, UpdateProductInput,
};

/// List all products with their stock
pub async fn list_inventory(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<Product>>> {
    let service = ProductService::new(state.db);
    let products = service.list_products().await?;
    Ok(Json(products))
}

/// Product name autocomplete
pub async fn suggest_products(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<SuggestQuery>,
) -> AppResult<Json<Vec<Product>>> {
    let service = ProductService::new(state.db);
    let products = service.suggest(&query.q).await?;
    Ok(Json(products))
}

/// Overwrite a product's name, brand and stock
pub async fn update_product(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(product_id): Path<i64>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.update_product(admin.0.user_id, product_id, input).await?;
    Ok(Json(product))
}

/// Reference counts of a product
pub async fn product_usage(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(product_id): Path<i64>,
) -> AppResult<Json<ProductUsageReport>> {
    let service = ProductService::new(state.db);
    let usage = service.usage(product_id).await?;
    Ok(Json(usage))
}

/// Every row referencing a product
pub async fn product_references(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(product_id): Path<i64>,
) -> AppResult<Json<ProductReferences>> {
    let service = ProductService::new(state.db);
    let references = service.references(product_id).await?;
    Ok(Json(references))
}

/// Delete selected references of a product
pub async fn delete_product_references(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(product_id): Path<i64>,
    Json(input): Json<DeleteReferencesInput>,
) -> AppResult<Json<DeletedReferences>> {
    let service = ProductService::new(state.db);
    let deleted = service
        .delete_references(admin.0.user_id, product_id, input)
        .await?;
    Ok(Json(deleted))
}

/// Delete an unreferenced product
pub async fn delete_product(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(product_id): Path<i64>,
) -> AppResult<StatusCode> {
    let service = ProductService::new(state.db);
    service.delete_product(admin.0.user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Merge duplicate products into a target
pub async fn merge_products(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(input): Json<MergeProductsInput>,
) -> AppResult<Json<MergeOutcome>> {
    let service = ProductService::new(state.db);
    let outcome = service.merge_products(admin.0.user_id, input).await?;
    Ok(Json(outcome))
}

// ============================================================================
// Ingresos
// ============================================================================

/// Register an intake batch
pub async fn create_ingreso(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateIngresoInput>,
) -> AppResult<(StatusCode, Json<IngresoCreated>)> {
    let service = IngresoService::new(state.db);
    let created = service.create_batch(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get an intake batch with its lines
pub async fn get_ingreso(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(batch_id): Path<i64>,
) -> AppResult<Json<IngresoBatch>> {
    let zone = state.config.display_zone();
    let service = IngresoService::new(state.db);
    let batch = service.get_batch(batch_id, zone).await?;
    Ok(Json(batch))
}

/// Edit an intake batch
pub async fn edit_ingreso(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<i64>,
    Json(input): Json<EditIngresoInput>,
) -> AppResult<Json<BatchEditSummary>> {
    let service = IngresoService::new(state.db);
    let summary = service
        .edit_batch(current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(summary))
}

/// Intake history
pub async fn list_ingresos(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<IngresoHistoryQuery>,
) -> AppResult<Json<Vec<IngresoBatch>>> {
    let zone = state.config.display_zone();
    let service = IngresoService::new(state.db);
    let batches = service.history(&query, zone).await?;
    Ok(Json(batches))
}
