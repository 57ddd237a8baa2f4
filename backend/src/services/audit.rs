//! Audit trail: recording user actions and querying them back

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::config::DisplayZone;
use crate::error::{AppError, AppResult};
use shared::text::filter_pattern;
use shared::{DateRange, LogFilter};

/// Write one audit row on the caller's connection (normally its transaction)
pub async fn record(
    conn: &mut PgConnection,
    user_id: i64,
    action: &str,
    target_table: &str,
    target_id: i64,
    details: impl Into<String>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO logs (user_id, action, target_table, target_id, details)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(action)
    .bind(target_table)
    .bind(target_id)
    .bind(details.into())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Audit log query service
#[derive(Clone)]
pub struct LogService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct LogRow {
    id: i64,
    username: Option<String>,
    action: String,
    target_table: Option<String>,
    target_id: Option<i64>,
    details: Option<String>,
    created_at: DateTime<Utc>,
}

/// Audit entry as returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub user: Option<String>,
    pub action: String,
    pub target_table: Option<String>,
    pub target_id: Option<i64>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
    /// `dd/mm/yyyy HH:MM:SS` in the display zone
    pub timestamp: String,
}

/// CSV export row
#[derive(Debug, Serialize)]
struct LogCsvRow<'a> {
    id: i64,
    timestamp: &'a str,
    user: &'a str,
    action: &'a str,
    target_table: &'a str,
    target_id: Option<i64>,
    details: &'a str,
}

impl LogService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Filtered audit entries, newest first
    pub async fn list(&self, filter: &LogFilter, zone: DisplayZone) -> AppResult<Vec<LogEntry>> {
        let range = DateRange::parse(filter.start.as_deref(), filter.end.as_deref());
        let (start, end) = zone.bounds(&range);

        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT l.id, u.username, l.action, l.target_table, l.target_id, l.details, l.created_at
            FROM logs l
            LEFT JOIN users u ON u.id = l.user_id
            WHERE ($1::text IS NULL OR u.username ILIKE $1)
              AND ($2::text IS NULL OR l.action ILIKE $2)
              AND ($3::text IS NULL OR l.target_table ILIKE $3)
              AND ($4::timestamptz IS NULL OR l.created_at >= $4)
              AND ($5::timestamptz IS NULL OR l.created_at < $5)
            ORDER BY l.created_at DESC, l.id DESC
            "#,
        )
        .bind(filter_pattern(filter.user.as_deref()))
        .bind(filter_pattern(filter.action.as_deref()))
        .bind(filter_pattern(filter.table.as_deref()))
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LogEntry {
                id: row.id,
                user: row.username,
                action: row.action,
                target_table: row.target_table,
                target_id: row.target_id,
                details: row.details,
                timestamp: zone.format_seconds(row.created_at),
                created_at: row.created_at,
            })
            .collect())
    }

    /// Same selection as [`LogService::list`], rendered as CSV
    pub async fn export_csv(&self, filter: &LogFilter, zone: DisplayZone) -> AppResult<String> {
        let entries = self.list(filter, zone).await?;
        Self::to_csv(&entries)
    }

    pub fn to_csv(entries: &[LogEntry]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for entry in entries {
            wtr.serialize(LogCsvRow {
                id: entry.id,
                timestamp: &entry.timestamp,
                user: entry.user.as_deref().unwrap_or(""),
                action: &entry.action,
                target_table: entry.target_table.as_deref().unwrap_or(""),
                target_id: entry.target_id,
                details: entry.details.as_deref().unwrap_or(""),
            })
            .map_err(|e| AppError::Internal(format!("CSV serialization failed: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV write failed: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV encoding failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, user: Option<&str>, details: &str) -> LogEntry {
        LogEntry {
            id,
            user: user.map(str::to_string),
            action: "create_ingreso_batch".to_string(),
            target_table: Some("ingreso_batches".to_string()),
            target_id: Some(3),
            details: Some(details.to_string()),
            created_at: Utc::now(),
            timestamp: "01/05/2024 10:00:00".to_string(),
        }
    }

    #[test]
    fn test_csv_has_header_and_rows() {
        let csv = LogService::to_csv(&[entry(1, Some("jperez"), "Ingreso 3"), entry(2, None, "x")]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id,timestamp,user,action,target_table,target_id,details");
        assert!(lines[1].starts_with("1,01/05/2024 10:00:00,jperez,create_ingreso_batch"));
        assert!(lines[2].contains(",,create_ingreso_batch"));
    }

    #[test]
    fn test_csv_quotes_commas() {
        let csv = LogService::to_csv(&[entry(1, Some("a"), "Cemento, Polpaico")]).unwrap();
        assert!(csv.contains("\"Cemento, Polpaico\""));
    }
}
