//! Error handling for the Warehouse Management Platform
//!
//! Provides consistent error responses in English and Spanish

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{stock::StockError, ProductUsage};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        message_es: String,
    },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_es: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {message}")]
    Conflict {
        resource: String,
        message: String,
        message_es: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Setup already completed")]
    SetupCompleted,

    #[error("Product {product_id} is still referenced")]
    ProductInUse {
        product_id: i64,
        usage: ProductUsage,
    },

    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    // Storage and rendering errors
    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Report error: {0}")]
    Report(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a field validation failure
    pub fn validation(field: impl Into<String>, message: impl Into<String>, message_es: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
            message_es: message_es.into(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_default();
        AppError::Validation {
            message: format!("Invalid value for {}", field),
            message_es: format!("Valor no válido para {}", field),
            field,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_es: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorDetail {
    pub fn new(code: &str, message_en: impl Into<String>, message_es: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_es: message_es.into(),
            field: None,
            details: None,
        }
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

fn stock_error_detail(err: &StockError) -> ErrorDetail {
    let message_es = match err {
        StockError::InvalidQuantity { line, quantity } => {
            format!("Línea {}: la cantidad {} no es válida", line, quantity)
        }
        StockError::DuplicateEntry { line, entry_id } => {
            format!("Línea {}: el registro {} aparece más de una vez", line, entry_id)
        }
        StockError::NegativeStock { line, product_id, resulting } => format!(
            "Línea {}: el stock del producto {} quedaría en {}",
            line, product_id, resulting
        ),
        StockError::InsufficientStock { line, product_id, available, requested } => format!(
            "Línea {}: stock insuficiente del producto {} (disponible {}, solicitado {})",
            line, product_id, available, requested
        ),
        StockError::RemovalWouldGoNegative { entry_id, product_id, resulting } => format!(
            "Eliminar el registro {} dejaría el producto {} en {}",
            entry_id, product_id, resulting
        ),
        StockError::UnknownProduct { product_id } => {
            format!("Producto {} no encontrado", product_id)
        }
        StockError::Overflow { product_id } => {
            format!("El stock del producto {} excede el máximo permitido", product_id)
        }
    };

    let detail = ErrorDetail::new("STOCK_CONFLICT", err.to_string(), message_es);
    match err.line() {
        Some(line) => detail
            .with_field(format!("items[{}]", line))
            .with_details(serde_json::json!({ "line": line })),
        None => detail,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new(
                    "INVALID_CREDENTIALS",
                    "Invalid username or password",
                    "Usuario o contraseña incorrectos",
                ),
            ),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("TOKEN_EXPIRED", "Token has expired", "La sesión ha expirado"),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", "Invalid token", "Token no válido"),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                    "Acceso restringido a administradores",
                ),
            ),
            AppError::Unauthorized { message, message_es } => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone(), message_es.clone()),
            ),
            AppError::Validation { field, message, message_es } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_es.clone())
                    .with_field(field.clone()),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(
                    "VALIDATION_ERROR",
                    msg.clone(),
                    format!("Datos no válidos: {}", msg),
                ),
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "DUPLICATE_ENTRY",
                    format!("A record with this {} already exists", field),
                    format!("Ya existe un registro con este valor de {}", field),
                )
                .with_field(field.clone()),
            ),
            AppError::Conflict { resource, message, message_es } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone(), message_es.clone())
                    .with_field(resource.clone()),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "NOT_FOUND",
                    format!("{} not found", resource),
                    format!("{} no encontrado", resource),
                ),
            ),
            AppError::SetupCompleted => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "SETUP_COMPLETED",
                    "An administrator already exists",
                    "Ya existe un administrador",
                ),
            ),
            AppError::ProductInUse { product_id, usage } => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "PRODUCT_IN_USE",
                    format!("Product {} has {} references", product_id, usage.total),
                    format!(
                        "El producto tiene {} referencias. Elimínelas o fusione el producto antes de borrarlo",
                        usage.total
                    ),
                )
                .with_details(serde_json::to_value(usage).unwrap_or_default()),
            ),
            AppError::Stock(err) => (StatusCode::UNPROCESSABLE_ENTITY, stock_error_detail(err)),
            AppError::Upload(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(
                    "UPLOAD_ERROR",
                    msg.clone(),
                    format!("Error al subir el archivo: {}", msg),
                ),
            ),
            AppError::StorageError(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new(
                    "STORAGE_ERROR",
                    format!("Storage error: {}", msg),
                    format!("Error de almacenamiento: {}", msg),
                ),
            ),
            AppError::Report(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "REPORT_ERROR",
                    format!("Could not render report: {}", msg),
                    "No se pudo generar el informe",
                ),
            ),
            AppError::DatabaseError(sqlx::Error::Database(db))
                if db.is_unique_violation() || db.is_foreign_key_violation() =>
            {
                (
                    StatusCode::CONFLICT,
                    ErrorDetail::new(
                        "CONFLICT",
                        "The record conflicts with existing data",
                        "El registro entra en conflicto con datos existentes",
                    ),
                )
            }
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "DATABASE_ERROR",
                    "A database error occurred",
                    "Ocurrió un error en la base de datos",
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone(), "Error interno del servidor"),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred",
                    "Error interno del servidor",
                ),
            ),
        };

        // Log the error for debugging
        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_error_maps_to_unprocessable() {
        let err = AppError::from(StockError::NegativeStock {
            line: 2,
            product_id: 7,
            resulting: -3,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_stock_error_detail_carries_line() {
        let detail = stock_error_detail(&StockError::InsufficientStock {
            line: 3,
            product_id: 1,
            available: 2,
            requested: 5,
        });
        assert_eq!(detail.field.as_deref(), Some("items[3]"));
        assert_eq!(detail.details, Some(serde_json::json!({ "line": 3 })));
    }

    #[test]
    fn test_product_in_use_is_conflict() {
        let err = AppError::ProductInUse {
            product_id: 4,
            usage: ProductUsage::new(1, 2, 0),
        };
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_not_found_status() {
        let response = AppError::NotFound("Product".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
