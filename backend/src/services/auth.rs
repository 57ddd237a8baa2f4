//! Authentication service for first-run setup, login, and token management

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::audit;
use crate::services::user::UserSummary;
use shared::text::clean_text;
use shared::{validate_password, validate_username, SetupInput};
use validator::Validate;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub username: String,
    pub name: String,
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Tokens plus the account they were issued for
#[derive(Debug, Serialize)]
pub struct AuthSession {
    #[serde(flatten)]
    pub tokens: AuthTokens,
    pub user: UserSummary,
}

/// Why an access token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

/// User info from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    name: String,
    password_hash: String,
    is_admin: bool,
}

/// Decode and validate an access token
pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}

/// Hash a bcrypt password off the async executor
pub async fn hash_password(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against its bcrypt hash off the async executor
pub async fn verify_password(password: String, password_hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify(password, &password_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Refresh tokens are stored as url-safe base64 SHA-256 digests
pub fn hash_refresh_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

fn invalid_login() -> AppError {
    AppError::InvalidCredentials
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Whether no account exists yet
    pub async fn setup_required(&self) -> AppResult<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(count == 0)
    }

    /// Create the first administrator. Only allowed while there are no users.
    pub async fn setup(&self, input: SetupInput) -> AppResult<UserSummary> {
        let input = SetupInput {
            name: clean_text(&input.name),
            username: clean_text(&input.username),
            email: clean_text(&input.email),
            ..input
        };
        let (name, username, email) = (input.name.clone(), input.username.clone(), input.email.clone());

        if name.is_empty() || username.is_empty() || email.is_empty() || input.password.is_empty() {
            return Err(AppError::validation(
                "setup",
                "All fields are required",
                "Todos los campos son obligatorios",
            ));
        }
        if input.password != input.password2 {
            return Err(AppError::validation(
                "password2",
                "Passwords do not match",
                "Las contraseñas no coinciden",
            ));
        }
        input.validate()?;
        validate_username(&username)
            .map_err(|msg| AppError::validation("username", msg, "Nombre de usuario no válido"))?;
        validate_password(&input.password).map_err(|msg| {
            AppError::validation(
                "password",
                msg,
                "La contraseña debe tener al menos 8 caracteres",
            )
        })?;

        let password_hash = hash_password(input.password).await?;

        let mut tx = self.db.begin().await?;

        // Serialise concurrent setup attempts on the users table
        sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            return Err(AppError::SetupCompleted);
        }

        let user = sqlx::query_as::<_, UserSummary>(
            r#"
            INSERT INTO users (username, name, email, password_hash, is_admin)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING id, username, name, email, is_admin, theme, created_at
            "#,
        )
        .bind(&username)
        .bind(&name)
        .bind(&email)
        .bind(&password_hash)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            user.id,
            "setup_admin",
            "users",
            user.id,
            format!("Administrador inicial {}", user.username),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = user.id, "Initial administrator created");
        Ok(user)
    }

    /// Authenticate user with username and password
    pub async fn login(&self, username: &str, password: &str) -> AppResult<AuthSession> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(invalid_login());
        }

        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, name, password_hash, is_admin
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(invalid_login)?;

        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            return Err(invalid_login());
        }

        let mut tx = self.db.begin().await?;
        let tokens = self.issue_tokens(&mut tx, &user).await?;
        audit::record(&mut tx, user.id, "login", "users", user.id, "Inicio de sesión").await?;
        let summary = sqlx::query_as::<_, UserSummary>(
            "SELECT id, username, name, email, is_admin, theme, created_at FROM users WHERE id = $1",
        )
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(AuthSession {
            tokens,
            user: summary,
        })
    }

    /// Exchange a refresh token for a new token pair, revoking the old one
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = hash_refresh_token(refresh_token);
        let mut tx = self.db.begin().await?;

        let user_id = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE token_hash = $1
              AND expires_at > NOW()
              AND revoked_at IS NULL
            RETURNING user_id
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Invalid or expired refresh token".to_string(),
            message_es: "La sesión expiró, inicie sesión nuevamente".to_string(),
        })?;

        let user = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, name, password_hash, is_admin FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let tokens = self.issue_tokens(&mut tx, &user).await?;
        tx.commit().await?;

        Ok(tokens)
    }

    /// Revoke a refresh token of this user and record the logout
    pub async fn logout(&self, user_id: i64, refresh_token: Option<&str>) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        if let Some(token) = refresh_token {
            sqlx::query(
                r#"
                UPDATE refresh_tokens
                SET revoked_at = NOW()
                WHERE token_hash = $1 AND user_id = $2 AND revoked_at IS NULL
                "#,
            )
            .bind(hash_refresh_token(token))
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        audit::record(&mut tx, user_id, "logout", "users", user_id, "Cierre de sesión").await?;
        tx.commit().await?;
        Ok(())
    }

    /// Generate access and refresh tokens and store the refresh token hash
    async fn issue_tokens(&self, conn: &mut PgConnection, user: &UserRow) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);
        let refresh_exp = now + Duration::seconds(self.refresh_token_expiry);

        let access_claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            name: user.name.clone(),
            is_admin: user.is_admin,
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Refresh token (opaque random token)
        let refresh_token = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user.id)
        .bind(hash_refresh_token(&refresh_token))
        .bind(refresh_exp)
        .execute(&mut *conn)
        .await?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp_offset: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: "7".to_string(),
            username: "jperez".to_string(),
            name: "Juan Pérez".to_string(),
            is_admin: true,
            exp: now + exp_offset,
            iat: now,
        }
    }

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_access_token_round_trip() {
        let token = sign(&claims(600), "secret");
        let decoded = decode_access_token(&token, "secret").unwrap();
        assert_eq!(decoded.sub, "7");
        assert!(decoded.is_admin);
    }

    #[test]
    fn test_access_token_wrong_secret() {
        let token = sign(&claims(600), "secret");
        assert_eq!(decode_access_token(&token, "other").unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_access_token_expired() {
        let token = sign(&claims(-3600), "secret");
        assert_eq!(decode_access_token(&token, "secret").unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn test_refresh_token_hash_is_stable() {
        let a = hash_refresh_token("abc");
        assert_eq!(a, hash_refresh_token("abc"));
        assert_ne!(a, hash_refresh_token("abd"));
        assert_eq!(a.len(), 43);
    }

    #[tokio::test]
    async fn test_password_hash_and_verify() {
        let hashed = hash_password("changeme123".to_string()).await.unwrap();
        assert!(verify_password("changeme123".to_string(), hashed.clone()).await.unwrap());
        assert!(!verify_password("wrong".to_string(), hashed).await.unwrap());
    }
}
