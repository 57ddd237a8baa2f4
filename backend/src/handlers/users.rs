//! HTTP handlers for user administration and the caller's own profile

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::error::AppResult;
use crate::handlers::auth::MessageResponse;
use crate::middleware::{AdminUser, CurrentUser};
use crate::services::user::{UserService, UserSummary};
use crate::AppState;
use shared::{
    ChangePasswordInput, CreateUserInput, Theme, ThemeInput, UpdateProfileInput, UpdateUserInput,
};

#[derive(Serialize)]
pub struct ThemeResponse {
    pub theme: Theme,
}

/// List all users
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<UserSummary>>> {
    let service = UserService::new(state.db);
    let users = service.list_users().await?;
    Ok(Json(users))
}

/// Create a user
pub async fn create_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(input): Json<CreateUserInput>,
) -> AppResult<(StatusCode, Json<UserSummary>)> {
    let service = UserService::new(state.db);
    let user = service.create_user(admin.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Edit a user's name, email and admin flag
pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
    Json(input): Json<UpdateUserInput>,
) -> AppResult<Json<UserSummary>> {
    let service = UserService::new(state.db);
    let user = service.update_user(admin.0.user_id, user_id, input).await?;
    Ok(Json(user))
}

/// Reset a user's password to the configured temporary password
pub async fn reset_password(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    let service = UserService::new(state.db.clone());
    service
        .reset_password(
            admin.0.user_id,
            user_id,
            &state.config.inventory.default_reset_password,
        )
        .await?;
    Ok(Json(MessageResponse {
        message: "Contraseña reseteada".to_string(),
    }))
}

/// Delete a user
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
) -> AppResult<StatusCode> {
    let service = UserService::new(state.db);
    service.delete_user(admin.0.user_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Profile
// ============================================================================

/// Get the caller's profile
pub async fn get_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<UserSummary>> {
    let service = UserService::new(state.db);
    let user = service.get_user(current_user.0.user_id).await?;
    Ok(Json(user))
}

/// Update the caller's name and email
pub async fn update_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<UpdateProfileInput>,
) -> AppResult<Json<UserSummary>> {
    let service = UserService::new(state.db);
    let user = service.update_profile(current_user.0.user_id, input).await?;
    Ok(Json(user))
}

/// Change the caller's password
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ChangePasswordInput>,
) -> AppResult<Json<MessageResponse>> {
    let service = UserService::new(state.db);
    service.change_password(current_user.0.user_id, input).await?;
    Ok(Json(MessageResponse {
        message: "Contraseña actualizada".to_string(),
    }))
}

/// Switch the caller's UI theme
pub async fn set_theme(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ThemeInput>,
) -> AppResult<Json<ThemeResponse>> {
    let service = UserService::new(state.db);
    let theme = service.set_theme(current_user.0.user_id, &input.theme).await?;
    Ok(Json(ThemeResponse { theme }))
}
