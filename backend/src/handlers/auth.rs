//! Authentication and first-run setup handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::auth::{AuthSession, AuthTokens};
use crate::services::user::UserSummary;
use crate::services::AuthService;
use crate::AppState;
use shared::{LoginInput, SetupInput};

#[derive(Serialize)]
pub struct SetupStatus {
    pub setup_required: bool,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize, Default)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Whether the first administrator still has to be created
pub async fn setup_status(State(state): State<AppState>) -> Result<Json<SetupStatus>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let setup_required = auth_service.setup_required().await?;
    Ok(Json(SetupStatus { setup_required }))
}

/// Create the first administrator
pub async fn setup(
    State(state): State<AppState>,
    Json(body): Json<SetupInput>,
) -> Result<(StatusCode, Json<UserSummary>), AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let user = auth_service.setup(body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<Json<AuthSession>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let session = auth_service.login(&body.username, &body.password).await?;
    Ok(Json(session))
}

/// Refresh token endpoint handler
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AuthTokens>, AppError> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.refresh_token(&body.refresh_token).await?;
    Ok(Json(tokens))
}

/// Revoke the caller's refresh token
pub async fn logout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(body) = body.unwrap_or_default();
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    auth_service
        .logout(current_user.0.user_id, body.refresh_token.as_deref())
        .await?;
    Ok(Json(MessageResponse {
        message: "Sesión cerrada".to_string(),
    }))
}
