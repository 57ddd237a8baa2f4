//! Authentication middleware
//!
//! JWT authentication and administrator access control

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};
use crate::services::auth::{decode_access_token, TokenError};
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub name: String,
    pub is_admin: bool,
}

impl AuthUser {
    /// Fail with 403 unless the user is an administrator
    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AppError::InsufficientPermissions)
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActiveUser {
    id: i64,
    username: String,
    name: String,
    is_admin: bool,
}

/// Authentication middleware that validates JWT tokens.
///
/// The account is re-read on every request so deleted users and revoked
/// admin rights take effect before the token expires.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    let claims = match decode_access_token(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => return AppError::TokenExpired.into_response(),
        Err(TokenError::Invalid) => return AppError::InvalidToken.into_response(),
    };

    let user_id = match claims.sub.parse::<i64>() {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid user ID in token"),
    };

    let user = sqlx::query_as::<_, ActiveUser>(
        "SELECT id, username, name, is_admin FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await;

    let user = match user {
        Ok(Some(user)) => user,
        Ok(None) => return unauthorized_response("User no longer exists"),
        Err(e) => return AppError::DatabaseError(e).into_response(),
    };

    request.extensions_mut().insert(AuthUser {
        user_id: user.id,
        username: user.username,
        name: user.name,
        is_admin: user.is_admin,
    });

    next.run(request).await
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message, "Debe iniciar sesión"),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                let error = ErrorResponse {
                    error: ErrorDetail::new(
                        "UNAUTHORIZED",
                        "Authentication required",
                        "Debe iniciar sesión",
                    ),
                };
                (StatusCode::UNAUTHORIZED, Json(error))
            })
    }
}

/// Extractor that only admits administrators
#[derive(Clone, Debug)]
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        user.require_admin().map_err(IntoResponse::into_response)?;
        Ok(AdminUser(user))
    }
}
