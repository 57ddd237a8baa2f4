//! Reporting handlers: dashboard, audit log and PDF/CSV downloads

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::audit::{LogEntry, LogService};
use crate::services::dashboard::{DashboardService, DashboardStats};
use crate::services::reporting::{PdfFile, ReportingService};
use crate::AppState;
use shared::LogFilter;

fn attachment(content_type: &str, file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

fn pdf_response(file: PdfFile) -> Response {
    attachment("application/pdf", &file.file_name, file.bytes)
}

/// Get dashboard metrics
pub async fn get_dashboard(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<DashboardStats>> {
    let zone = state.config.display_zone();
    let threshold = state.config.inventory.critical_stock_threshold;
    let service = DashboardService::new(state.db.clone());
    let stats = service.get_stats(threshold, zone).await?;
    Ok(Json(stats))
}

/// Audit log, newest first
pub async fn list_logs(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<LogFilter>,
) -> AppResult<Json<Vec<LogEntry>>> {
    let zone = state.config.display_zone();
    let service = LogService::new(state.db.clone());
    let entries = service.list(&filter, zone).await?;
    Ok(Json(entries))
}

/// Audit log as a CSV download
pub async fn export_logs(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<LogFilter>,
) -> AppResult<impl IntoResponse> {
    let zone = state.config.display_zone();
    let service = LogService::new(state.db.clone());
    let csv = service.export_csv(&filter, zone).await?;
    let file_name = format!("logs_{}.csv", zone.today().format("%Y%m%d"));
    Ok(attachment("text/csv; charset=utf-8", &file_name, csv.into_bytes()))
}

/// Dispatch batch report
pub async fn dispatch_pdf(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(batch_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let zone = state.config.display_zone();
    let service = ReportingService::new(state.db.clone());
    let file = service
        .dispatch_pdf(batch_id, &state.config.uploads, zone)
        .await?;
    Ok(pdf_response(file))
}

/// Purchase order report
pub async fn order_pdf(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(order_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let zone = state.config.display_zone();
    let service = ReportingService::new(state.db.clone());
    let file = service
        .order_pdf(order_id, &state.config.uploads, zone)
        .await?;
    Ok(pdf_response(file))
}
