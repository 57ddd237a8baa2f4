//! HTTP handlers for dispatch batches and their photos

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::dispatch::{
    DispatchBatch, DispatchCreated, DispatchEdited, DispatchPhoto, DispatchService,
};
use crate::AppState;
use shared::{CreateDispatchInput, DispatchHistoryQuery, EditDispatchInput, PhotoStage};

/// Register a dispatch batch
pub async fn create_dispatch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateDispatchInput>,
) -> AppResult<(StatusCode, Json<DispatchCreated>)> {
    let service = DispatchService::new(state.db);
    let created = service.create_batch(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get a dispatch batch with its lines
pub async fn get_dispatch(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(batch_id): Path<i64>,
) -> AppResult<Json<DispatchBatch>> {
    let zone = state.config.display_zone();
    let service = DispatchService::new(state.db);
    let batch = service.get_batch(batch_id, zone).await?;
    Ok(Json(batch))
}

/// Edit a dispatch batch
pub async fn edit_dispatch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<i64>,
    Json(input): Json<EditDispatchInput>,
) -> AppResult<Json<DispatchEdited>> {
    let service = DispatchService::new(state.db);
    let edited = service
        .edit_batch(current_user.0.user_id, batch_id, input)
        .await?;
    Ok(Json(edited))
}

/// Dispatch history
pub async fn list_dispatches(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<DispatchHistoryQuery>,
) -> AppResult<Json<Vec<DispatchBatch>>> {
    let zone = state.config.display_zone();
    let service = DispatchService::new(state.db);
    let batches = service.history(&query, zone).await?;
    Ok(Json(batches))
}

// ============================================================================
// Photos
// ============================================================================

/// List the photos of a dispatch batch
pub async fn list_photos(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(batch_id): Path<i64>,
) -> AppResult<Json<Vec<DispatchPhoto>>> {
    let service = DispatchService::new(state.db);
    let photos = service.list_photos(batch_id).await?;
    Ok(Json(photos))
}

/// Upload a photo (`stage` and `photo` multipart fields)
pub async fn upload_photo(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DispatchPhoto>)> {
    let uploads = &state.config.uploads;
    let mut stage: Option<PhotoStage> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Upload(e.to_string()))?
    {
        match field.name() {
            Some("stage") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Upload(e.to_string()))?;
                let parsed = value.parse().map_err(|msg: &str| {
                    AppError::validation("stage", msg, "La etapa debe ser 'salida' o 'entrega'")
                })?;
                stage = Some(parsed);
            }
            Some("photo") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Upload(e.to_string()))?;
                if data.len() > uploads.max_bytes {
                    return Err(AppError::Upload(format!(
                        "File exceeds {} bytes",
                        uploads.max_bytes
                    )));
                }
                file = Some((file_name, data.to_vec()));
            }
            _ => {}
        }
    }

    let stage = stage.ok_or_else(|| {
        AppError::validation("stage", "Stage is required", "Debe indicar la etapa de la foto")
    })?;
    let (file_name, data) =
        file.ok_or_else(|| AppError::Upload("No photo was sent".to_string()))?;

    let service = DispatchService::new(state.db.clone());
    let photo = service
        .add_photo(current_user.0.user_id, batch_id, stage, &file_name, &data, uploads)
        .await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

/// Delete a photo and its file
pub async fn delete_photo(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((batch_id, photo_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    let service = DispatchService::new(state.db.clone());
    service
        .delete_photo(current_user.0.user_id, batch_id, photo_id, &state.config.uploads)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
