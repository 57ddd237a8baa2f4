//! User administration and self-service profile management

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::audit;
use crate::services::auth::{hash_password, verify_password};
use shared::text::clean_text;
use shared::{
    validate_password, validate_username, ChangePasswordInput, CreateUserInput, Theme,
    UpdateProfileInput, UpdateUserInput,
};

/// User service
#[derive(Clone)]
pub struct UserService {
    db: PgPool,
}

/// Account as shown to clients (never carries the password hash)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub theme: String,
    pub created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, username, name, email, is_admin, theme, created_at";

impl UserService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All users ordered by username
    pub async fn list_users(&self) -> AppResult<Vec<UserSummary>> {
        let users = sqlx::query_as::<_, UserSummary>(&format!(
            "SELECT {} FROM users ORDER BY username",
            USER_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    pub async fn get_user(&self, user_id: i64) -> AppResult<UserSummary> {
        sqlx::query_as::<_, UserSummary>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }

    /// Create an account (administrators only)
    pub async fn create_user(&self, actor_id: i64, input: CreateUserInput) -> AppResult<UserSummary> {
        let username = clean_text(&input.username);
        let name = clean_text(&input.name);
        let email = clean_text(&input.email);

        if username.is_empty() || name.is_empty() || email.is_empty() || input.password.is_empty() {
            return Err(AppError::validation(
                "user",
                "All fields are required",
                "Todos los campos son obligatorios",
            ));
        }
        CreateUserInput {
            username: username.clone(),
            password: String::new(),
            email: email.clone(),
            name: name.clone(),
            is_admin: input.is_admin,
        }
        .validate()?;
        validate_username(&username)
            .map_err(|msg| AppError::validation("username", msg, "Nombre de usuario no válido"))?;
        validate_password(&input.password).map_err(|msg| {
            AppError::validation(
                "password",
                msg,
                "La contraseña debe tener al menos 8 caracteres",
            )
        })?;

        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR name = $2)",
        )
        .bind(&username)
        .bind(&name)
        .fetch_one(&self.db)
        .await?;
        if taken {
            return Err(AppError::Conflict {
                resource: "user".to_string(),
                message: "Username or name already in use".to_string(),
                message_es: "El usuario o nombre ya existe".to_string(),
            });
        }

        let password_hash = hash_password(input.password).await?;

        let mut tx = self.db.begin().await?;
        let user = sqlx::query_as::<_, UserSummary>(&format!(
            r#"
            INSERT INTO users (username, name, email, password_hash, is_admin)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&username)
        .bind(&name)
        .bind(&email)
        .bind(&password_hash)
        .bind(input.is_admin)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor_id,
            "create_user",
            "users",
            user.id,
            format!("Usuario creado: {}", user.username),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, "User {} created", user.username);
        Ok(user)
    }

    /// Edit name, email and admin flag (administrators only)
    pub async fn update_user(
        &self,
        actor_id: i64,
        user_id: i64,
        input: UpdateUserInput,
    ) -> AppResult<UserSummary> {
        let input = UpdateUserInput {
            name: clean_text(&input.name),
            email: clean_text(&input.email),
            is_admin: input.is_admin,
        };
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let user = sqlx::query_as::<_, UserSummary>(&format!(
            r#"
            UPDATE users SET name = $2, email = $3, is_admin = $4
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.is_admin)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        audit::record(
            &mut tx,
            actor_id,
            "edit_user",
            "users",
            user.id,
            format!("Usuario editado: {}", user.username),
        )
        .await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Reset a user's password to the configured temporary password
    pub async fn reset_password(&self, actor_id: i64, user_id: i64, temporary: &str) -> AppResult<()> {
        let password_hash = hash_password(temporary.to_string()).await?;

        let mut tx = self.db.begin().await?;
        let username = sqlx::query_scalar::<_, String>(
            "UPDATE users SET password_hash = $2 WHERE id = $1 RETURNING username",
        )
        .bind(user_id)
        .bind(&password_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        // Outstanding sessions must not survive a reset
        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            actor_id,
            "reset_password",
            "users",
            user_id,
            format!("Contraseña reseteada para {}", username),
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Delete an account. Administrators cannot delete themselves.
    pub async fn delete_user(&self, actor_id: i64, user_id: i64) -> AppResult<()> {
        if actor_id == user_id {
            return Err(AppError::Conflict {
                resource: "user".to_string(),
                message: "You cannot delete your own account".to_string(),
                message_es: "No puedes eliminar tu propio usuario".to_string(),
            });
        }

        let mut tx = self.db.begin().await?;
        let username = sqlx::query_scalar::<_, String>("DELETE FROM users WHERE id = $1 RETURNING username")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        audit::record(
            &mut tx,
            actor_id,
            "delete_user",
            "users",
            user_id,
            format!("Usuario eliminado: {}", username),
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }

    // ========================================================================
    // Profile
    // ========================================================================

    /// Update the caller's own name and email
    pub async fn update_profile(&self, user_id: i64, input: UpdateProfileInput) -> AppResult<UserSummary> {
        let input = UpdateProfileInput {
            name: clean_text(&input.name),
            email: clean_text(&input.email),
        };
        input.validate()?;

        let current = self.get_user(user_id).await?;

        let mut tx = self.db.begin().await?;
        let user = sqlx::query_as::<_, UserSummary>(&format!(
            "UPDATE users SET name = $2, email = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.email)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            user_id,
            "update_profile",
            "users",
            user_id,
            format!(
                "Nombre: '{}' -> '{}', Email: '{}' -> '{}'",
                current.name, user.name, current.email, user.email
            ),
        )
        .await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Change the caller's own password after checking the current one
    pub async fn change_password(&self, user_id: i64, input: ChangePasswordInput) -> AppResult<()> {
        if input.old_pass.is_empty() || input.new_pass.is_empty() || input.repeat_new_pass.is_empty() {
            return Err(AppError::validation(
                "password",
                "All fields are required",
                "Todos los campos son obligatorios",
            ));
        }
        if input.new_pass != input.repeat_new_pass {
            return Err(AppError::validation(
                "repeat_new_pass",
                "New passwords do not match",
                "Las nuevas contraseñas no coinciden",
            ));
        }
        validate_password(&input.new_pass).map_err(|msg| {
            AppError::validation(
                "new_pass",
                msg,
                "La contraseña debe tener al menos 8 caracteres",
            )
        })?;

        let current_hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if !verify_password(input.old_pass, current_hash).await? {
            return Err(AppError::validation(
                "old_pass",
                "Current password is incorrect",
                "La contraseña actual es incorrecta",
            ));
        }

        let password_hash = hash_password(input.new_pass).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(&password_hash)
            .execute(&mut *tx)
            .await?;
        audit::record(
            &mut tx,
            user_id,
            "change_password",
            "users",
            user_id,
            "Contraseña actualizada",
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Switch the caller's UI theme
    pub async fn set_theme(&self, user_id: i64, theme: &str) -> AppResult<Theme> {
        let theme: Theme = theme.trim().parse().map_err(|msg: &str| {
            AppError::validation("theme", msg, "El tema debe ser 'dark' o 'light'")
        })?;

        let mut tx = self.db.begin().await?;
        let updated = sqlx::query("UPDATE users SET theme = $2 WHERE id = $1")
            .bind(user_id)
            .bind(theme.as_str())
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }
        audit::record(
            &mut tx,
            user_id,
            "change_theme",
            "users",
            user_id,
            format!("Tema cambiado a {}", theme.as_str()),
        )
        .await?;
        tx.commit().await?;

        Ok(theme)
    }
}
