//! Dashboard metrics

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::config::DisplayZone;
use crate::error::AppResult;
use crate::services::order::OrderService;
use shared::StatusTotals;

/// Days covered by the dispatch series, today included
pub const SERIES_DAYS: i64 = 14;
/// Window for the "recent clients" counter
pub const RECENT_CLIENT_DAYS: i64 = 30;

/// Dashboard service
#[derive(Clone)]
pub struct DashboardService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct CountsRow {
    products: i64,
    total_stock: i64,
    dispatch_batches: i64,
    clients: i64,
    critical_stock: i64,
    recent_clients: i64,
}

/// Dispatch batches registered on one local day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    pub day: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopClient {
    pub client: String,
    pub dispatches: i64,
    pub units: i64,
}

/// Dashboard metrics
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub products: i64,
    pub total_stock: i64,
    pub dispatch_batches: i64,
    pub clients: i64,
    pub orders: usize,
    pub critical_stock: i64,
    pub critical_threshold: i32,
    pub clients_last_30_days: i64,
    pub order_status: StatusTotals,
    pub dispatch_series: Vec<SeriesPoint>,
    pub top_clients: Vec<TopClient>,
}

/// Zero-filled daily counts for the `SERIES_DAYS` days ending on `today`,
/// oldest first. Timestamps outside the window are ignored.
pub fn dispatch_series(today: NaiveDate, zone: DisplayZone, stamps: &[DateTime<Utc>]) -> Vec<SeriesPoint> {
    let first = today - Duration::days(SERIES_DAYS - 1);
    let mut series: Vec<SeriesPoint> = (0..SERIES_DAYS)
        .map(|offset| SeriesPoint {
            day: first + Duration::days(offset),
            count: 0,
        })
        .collect();

    for stamp in stamps {
        let day = zone.local_date(*stamp);
        let offset = (day - first).num_days();
        if (0..SERIES_DAYS).contains(&offset) {
            series[offset as usize].count += 1;
        }
    }
    series
}

impl DashboardService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_stats(&self, critical_threshold: i32, zone: DisplayZone) -> AppResult<DashboardStats> {
        let now = Utc::now();

        let counts = sqlx::query_as::<_, CountsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM products) AS products,
                (SELECT COALESCE(SUM(stock), 0)::bigint FROM products) AS total_stock,
                (SELECT COUNT(*) FROM dispatch_batches) AS dispatch_batches,
                (SELECT COUNT(*) FROM clients) AS clients,
                (SELECT COUNT(*) FROM products WHERE stock <= $1) AS critical_stock,
                (SELECT COUNT(DISTINCT client_id) FROM dispatch_batches WHERE created_at >= $2) AS recent_clients
            "#,
        )
        .bind(critical_threshold)
        .bind(now - Duration::days(RECENT_CLIENT_DAYS))
        .fetch_one(&self.db)
        .await?;

        let today = zone.today();
        let window_start = zone.start_of_day(today - Duration::days(SERIES_DAYS - 1));
        let stamps = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT created_at FROM dispatch_batches WHERE created_at >= $1",
        )
        .bind(window_start)
        .fetch_all(&self.db)
        .await?;

        let top_clients = sqlx::query_as::<_, TopClient>(
            r#"
            SELECT c.name AS client,
                   COUNT(DISTINCT b.id) AS dispatches,
                   COALESCE(SUM(e.quantity), 0)::bigint AS units
            FROM clients c
            JOIN dispatch_batches b ON b.client_id = c.id
            LEFT JOIN dispatch_entries e ON e.batch_id = b.id
            GROUP BY c.id, c.name
            ORDER BY units DESC, c.name
            LIMIT 3
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let orders = OrderService::new(self.db.clone()).list_orders(zone).await?;
        let order_status: StatusTotals = orders.iter().map(|o| o.status).collect();

        Ok(DashboardStats {
            products: counts.products,
            total_stock: counts.total_stock,
            dispatch_batches: counts.dispatch_batches,
            clients: counts.clients,
            orders: orders.len(),
            critical_stock: counts.critical_stock,
            critical_threshold,
            clients_last_30_days: counts.recent_clients,
            order_status,
            dispatch_series: dispatch_series(today, zone, &stamps),
            top_clients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_series_is_zero_filled() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let series = dispatch_series(today, DisplayZone::from_minutes(0), &[]);
        assert_eq!(series.len(), 14);
        assert_eq!(series[0].day, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(series[13].day, today);
        assert!(series.iter().all(|p| p.count == 0));
    }

    #[test]
    fn test_series_buckets_by_local_day() {
        let zone = DisplayZone::from_minutes(-180);
        let today = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let stamps = vec![
            // 01:30 UTC on the 14th is still the 13th locally
            Utc.with_ymd_and_hms(2024, 3, 14, 1, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 14, 15, 0, 0).unwrap(),
            // Outside the window
            Utc.with_ymd_and_hms(2024, 2, 20, 12, 0, 0).unwrap(),
        ];
        let series = dispatch_series(today, zone, &stamps);
        assert_eq!(series[13].count, 2);
        assert_eq!(series[12].count, 1);
        assert_eq!(series.iter().map(|p| p.count).sum::<i64>(), 3);
    }
}
