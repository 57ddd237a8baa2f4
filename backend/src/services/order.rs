//! Purchase orders (órdenes de compra) and their fulfillment progress
//!
//! Orders never move stock. Progress is read from the dispatch batches
//! tagged with the order number.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::config::DisplayZone;
use crate::error::{AppError, AppResult};
use crate::services::audit;
use crate::services::catalog::{describe, find_or_create_client, find_or_create_product, product_label, Product};
use crate::services::dispatch::{DispatchBatch, DispatchService};
use shared::text::clean_text;
use shared::{
    validate_client_name, validate_order_number, validate_positive_quantity, CreateOrderInput,
    EditOrderInput, ItemProgress, OrderStatus,
};

/// Purchase order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    number: String,
    client_id: i64,
    client: String,
    created_at: DateTime<Utc>,
    requested: i64,
    dispatched: i64,
}

/// Order as listed, with its fulfillment status
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub id: i64,
    pub number: String,
    pub client_id: i64,
    pub client: String,
    pub created_at: DateTime<Utc>,
    pub date: String,
    pub requested: i64,
    pub dispatched: i64,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub badge: &'static str,
}

impl OrderSummary {
    fn from_row(row: OrderRow, zone: DisplayZone) -> Self {
        let status = OrderStatus::from_totals(row.requested, row.dispatched);
        Self {
            id: row.id,
            number: row.number,
            client_id: row.client_id,
            client: row.client,
            date: zone.format(row.created_at),
            created_at: row.created_at,
            requested: row.requested,
            dispatched: row.dispatched,
            status,
            status_label: status.label(),
            badge: status.badge(),
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    item_id: i64,
    product_id: i64,
    name: String,
    brand: String,
    requested: i64,
    dispatched: i64,
}

/// Order item with requested, dispatched and pending units
#[derive(Debug, Clone, Serialize)]
pub struct OrderItemView {
    pub item_id: i64,
    pub product_id: i64,
    pub name: String,
    pub brand: String,
    #[serde(flatten)]
    pub progress: ItemProgress,
    pub complete: bool,
}

impl From<ItemRow> for OrderItemView {
    fn from(row: ItemRow) -> Self {
        let progress = ItemProgress::new(row.requested, row.dispatched);
        Self {
            item_id: row.item_id,
            product_id: row.product_id,
            name: row.name,
            brand: row.brand,
            complete: progress.is_complete(),
            progress,
        }
    }
}

/// Order with per-item progress and the tagged dispatches
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderSummary,
    pub items: Vec<OrderItemView>,
    pub dispatches: Vec<DispatchBatch>,
}

/// Per-item progress looked up by order number (used by the dispatch form)
#[derive(Debug, Clone, Serialize)]
pub struct OrderProgress {
    pub order_id: i64,
    pub order_number: String,
    pub client: String,
    pub items: Vec<OrderItemView>,
}

/// One stored order line
#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    pub item_id: i64,
    pub product_id: i64,
    pub name: String,
    pub brand: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCreated {
    pub order_id: i64,
    pub number: String,
    pub client: String,
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderEdited {
    pub order_id: i64,
    pub number: String,
    pub client: String,
    /// Dispatch batches moved to the new number
    pub retagged_batches: u64,
    pub items: Vec<OrderLine>,
    pub removed_items: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDeleted {
    pub order_id: i64,
    pub number: String,
    /// Dispatch batches whose tag was cleared
    pub detached_batches: u64,
}

/// Cleaned number and client of an order form
fn order_header(number: &str, client: &str) -> AppResult<(String, String)> {
    let number = clean_text(number);
    validate_order_number(&number)
        .map_err(|msg| AppError::validation("number", msg, "Falta el número de orden"))?;
    let client = clean_text(client);
    validate_client_name(&client)
        .map_err(|msg| AppError::validation("client", msg, "Falta el nombre del cliente"))?;
    Ok((number, client))
}

fn line_error(line: usize, msg: &str) -> AppError {
    AppError::validation(
        format!("items[{}]", line),
        format!("Line {}: {}", line, msg),
        format!("Línea {}: 'quantity' debe ser entero > 0", line),
    )
}

fn number_taken() -> AppError {
    AppError::Conflict {
        resource: "purchase_order".to_string(),
        message: "An order with that number already exists".to_string(),
        message_es: "Ya existe una orden con ese número".to_string(),
    }
}

/// Reject an item id submitted twice in one edit
fn check_item_ids(ids: &[Option<i64>]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for (idx, id) in ids.iter().enumerate() {
        if let Some(id) = id {
            if !seen.insert(*id) {
                return Err(AppError::validation(
                    format!("items[{}]", idx + 1),
                    format!("Line {}: item {} is repeated", idx + 1, id),
                    format!("Línea {}: el ítem {} está repetido", idx + 1, id),
                ));
            }
        }
    }
    Ok(())
}

const ORDER_SELECT: &str = r#"
    SELECT o.id, o.number, o.client_id, c.name AS client, o.created_at,
           COALESCE((SELECT SUM(i.quantity) FROM purchase_order_items i
                     WHERE i.order_id = o.id), 0)::bigint AS requested,
           COALESCE((SELECT SUM(e.quantity) FROM dispatch_entries e
                     JOIN dispatch_batches b ON b.id = e.batch_id
                     WHERE b.order_number = o.number), 0)::bigint AS dispatched
    FROM purchase_orders o
    JOIN clients c ON c.id = o.client_id
"#;

async fn order_items(conn: &mut PgConnection, order_id: i64, number: &str) -> AppResult<Vec<OrderItemView>> {
    let rows = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT i.id AS item_id, i.product_id, p.name, p.brand,
               i.quantity::bigint AS requested,
               COALESCE((SELECT SUM(e.quantity) FROM dispatch_entries e
                         JOIN dispatch_batches b ON b.id = e.batch_id
                         WHERE b.order_number = $2 AND e.product_id = i.product_id), 0)::bigint AS dispatched
        FROM purchase_order_items i
        JOIN products p ON p.id = i.product_id
        WHERE i.order_id = $1
        ORDER BY i.id
        "#,
    )
    .bind(order_id)
    .bind(number)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(OrderItemView::from).collect())
}

impl OrderService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All orders, newest first
    pub async fn list_orders(&self, zone: DisplayZone) -> AppResult<Vec<OrderSummary>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{} ORDER BY o.created_at DESC, o.id DESC",
            ORDER_SELECT
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OrderSummary::from_row(row, zone))
            .collect())
    }

    async fn get_summary(&self, order_id: i64, zone: DisplayZone) -> AppResult<OrderSummary> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("{} WHERE o.id = $1", ORDER_SELECT))
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;
        Ok(OrderSummary::from_row(row, zone))
    }

    /// Create an order. Unknown products are created with zero stock.
    pub async fn create_order(&self, user_id: i64, input: CreateOrderInput) -> AppResult<OrderCreated> {
        let (number, client_name) = order_header(&input.number, &input.client)?;
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "At least one item is required",
                "Debes enviar al menos un producto",
            ));
        }

        let mut labels = Vec::with_capacity(input.items.len());
        for (idx, item) in input.items.iter().enumerate() {
            let line = idx + 1;
            let label = product_label(line, &item.name, &item.brand)?;
            validate_positive_quantity(item.quantity).map_err(|msg| line_error(line, msg))?;
            labels.push(label);
        }

        let mut tx = self.db.begin().await?;

        let taken = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM purchase_orders WHERE number = $1)")
            .bind(&number)
            .fetch_one(&mut *tx)
            .await?;
        if taken {
            return Err(number_taken());
        }

        let client = find_or_create_client(&mut tx, &client_name).await?;
        let order_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO purchase_orders (number, client_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(&number)
        .bind(client.id)
        .fetch_one(&mut *tx)
        .await?;

        let mut lines = Vec::with_capacity(labels.len());
        for (item, (name, brand)) in input.items.iter().zip(&labels) {
            let (product, _) = find_or_create_product(&mut tx, name, brand).await?;
            let item_id = insert_item(&mut tx, order_id, product.id, item.quantity).await?;

            audit::record(
                &mut tx,
                user_id,
                "add_po_item",
                "purchase_order_items",
                item_id,
                format!(
                    "Agregó a OC {} el producto {} (id {}) por {} unidad(es)",
                    number,
                    describe(&product),
                    product.id,
                    item.quantity
                ),
            )
            .await?;

            lines.push(order_line(item_id, product, item.quantity));
        }

        audit::record(
            &mut tx,
            user_id,
            "create_purchase_order",
            "purchase_orders",
            order_id,
            format!(
                "Creó orden de compra {} para cliente {} con {} ítems",
                number,
                client.name,
                lines.len()
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(order_id, items = lines.len(), "Purchase order {} created", number);
        Ok(OrderCreated {
            order_id,
            number,
            client: client.name,
            items: lines,
        })
    }

    /// Order with per-item progress and the dispatches tagged with it
    pub async fn get_detail(&self, order_id: i64, zone: DisplayZone) -> AppResult<OrderDetail> {
        let order = self.get_summary(order_id, zone).await?;

        let mut conn = self.db.acquire().await?;
        let items = order_items(&mut conn, order.id, &order.number).await?;
        drop(conn);

        let dispatches = DispatchService::new(self.db.clone())
            .batches_for_order(&order.number, zone)
            .await?;

        Ok(OrderDetail {
            order,
            items,
            dispatches,
        })
    }

    /// Per-item progress of the order carrying `number`
    pub async fn progress_by_number(&self, number: &str) -> AppResult<OrderProgress> {
        let number = clean_text(number);
        let mut conn = self.db.acquire().await?;

        let (order_id, client) = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT o.id, c.name
            FROM purchase_orders o
            JOIN clients c ON c.id = o.client_id
            WHERE o.number = $1
            "#,
        )
        .bind(&number)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

        let items = order_items(&mut conn, order_id, &number).await?;
        Ok(OrderProgress {
            order_id,
            order_number: number,
            client,
            items,
        })
    }

    /// Rewrite an order's number, client and items. Renumbering moves the
    /// tag on every dispatch batch that carried the old number.
    pub async fn edit_order(&self, user_id: i64, order_id: i64, input: EditOrderInput) -> AppResult<OrderEdited> {
        let (number, client_name) = order_header(&input.number, &input.client)?;
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "At least one item is required",
                "La orden debe tener al menos un producto",
            ));
        }

        let mut labels = Vec::with_capacity(input.items.len());
        for (idx, item) in input.items.iter().enumerate() {
            let line = idx + 1;
            let label = product_label(line, &item.name, &item.brand)?;
            validate_positive_quantity(item.quantity).map_err(|msg| line_error(line, msg))?;
            labels.push(label);
        }
        let submitted: Vec<Option<i64>> = input.items.iter().map(|i| i.item_id).collect();
        check_item_ids(&submitted)?;

        let mut tx = self.db.begin().await?;

        let old_number = sqlx::query_scalar::<_, String>("SELECT number FROM purchase_orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

        let mut retagged_batches = 0;
        if number != old_number {
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM purchase_orders WHERE number = $1 AND id <> $2)",
            )
            .bind(&number)
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(number_taken());
            }

            retagged_batches = sqlx::query("UPDATE dispatch_batches SET order_number = $2 WHERE order_number = $1")
                .bind(&old_number)
                .bind(&number)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        let client = find_or_create_client(&mut tx, &client_name).await?;
        sqlx::query("UPDATE purchase_orders SET number = $2, client_id = $3 WHERE id = $1")
            .bind(order_id)
            .bind(&number)
            .bind(client.id)
            .execute(&mut *tx)
            .await?;

        let existing: HashSet<i64> = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM purchase_order_items WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let mut lines = Vec::with_capacity(labels.len());
        for (item, (name, brand)) in input.items.iter().zip(&labels) {
            let (product, _) = find_or_create_product(&mut tx, name, brand).await?;

            let item_id = match item.item_id.filter(|id| existing.contains(id)) {
                Some(item_id) => {
                    sqlx::query("UPDATE purchase_order_items SET product_id = $2, quantity = $3 WHERE id = $1")
                        .bind(item_id)
                        .bind(product.id)
                        .bind(item.quantity)
                        .execute(&mut *tx)
                        .await?;
                    item_id
                }
                None => insert_item(&mut tx, order_id, product.id, item.quantity).await?,
            };
            lines.push(order_line(item_id, product, item.quantity));
        }

        let kept: HashSet<i64> = lines.iter().map(|l| l.item_id).collect();
        let mut removed_items: Vec<i64> = existing.difference(&kept).copied().collect();
        removed_items.sort_unstable();
        if !removed_items.is_empty() {
            sqlx::query("DELETE FROM purchase_order_items WHERE id = ANY($1)")
                .bind(&removed_items)
                .execute(&mut *tx)
                .await?;
        }

        let mut current: Vec<i64> = kept.into_iter().collect();
        current.sort_unstable();
        audit::record(
            &mut tx,
            user_id,
            "edit_purchase_order",
            "purchase_orders",
            order_id,
            format!(
                "Editó orden de compra {}: cliente {}, ítems vigentes {:?}",
                number, client.name, current
            ),
        )
        .await?;

        tx.commit().await?;

        Ok(OrderEdited {
            order_id,
            number,
            client: client.name,
            retagged_batches,
            items: lines,
            removed_items,
        })
    }

    /// Delete an order, clearing its tag from dispatch batches first
    pub async fn delete_order(&self, user_id: i64, order_id: i64) -> AppResult<OrderDeleted> {
        let mut tx = self.db.begin().await?;

        let number = sqlx::query_scalar::<_, String>("SELECT number FROM purchase_orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase order".to_string()))?;

        let detached_batches = sqlx::query("UPDATE dispatch_batches SET order_number = NULL WHERE order_number = $1")
            .bind(&number)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM purchase_order_items WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM purchase_orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            user_id,
            "delete_purchase_order",
            "purchase_orders",
            order_id,
            format!(
                "Eliminó orden de compra {} ({} despachos desasociados)",
                number, detached_batches
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(order_id, detached_batches, "Purchase order {} deleted", number);
        Ok(OrderDeleted {
            order_id,
            number,
            detached_batches,
        })
    }
}

async fn insert_item(conn: &mut PgConnection, order_id: i64, product_id: i64, quantity: i32) -> AppResult<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO purchase_order_items (order_id, product_id, quantity)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(order_id)
    .bind(product_id)
    .bind(quantity)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

fn order_line(item_id: i64, product: Product, quantity: i32) -> OrderLine {
    OrderLine {
        item_id,
        product_id: product.id,
        name: product.name,
        brand: product.brand,
        quantity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_header_cleans_fields() {
        let (number, client) = order_header("  OC-1001 ", " Ferretería Sur ").unwrap();
        assert_eq!(number, "OC-1001");
        assert_eq!(client, "Ferretería Sur");
    }

    #[test]
    fn test_order_header_requires_both() {
        assert!(order_header("", "Cliente").is_err());
        assert!(order_header("OC-1", "   ").is_err());
    }

    #[test]
    fn test_repeated_item_ids() {
        assert!(check_item_ids(&[Some(1), None, Some(2), None]).is_ok());
        assert!(check_item_ids(&[Some(1), Some(1)]).is_err());
    }

    #[test]
    fn test_summary_status() {
        let row = OrderRow {
            id: 1,
            number: "OC-1".to_string(),
            client_id: 3,
            client: "Cliente".to_string(),
            created_at: Utc::now(),
            requested: 10,
            dispatched: 4,
        };
        let summary = OrderSummary::from_row(row, DisplayZone::from_minutes(0));
        assert_eq!(summary.status, OrderStatus::Partial);
        assert_eq!(summary.status_label, "Parcial");
        assert_eq!(summary.badge, "warning text-dark");
    }

    #[test]
    fn test_item_view_completion() {
        let row = |dispatched| ItemRow {
            item_id: 1,
            product_id: 2,
            name: "Cemento".to_string(),
            brand: "Polpaico".to_string(),
            requested: 8,
            dispatched,
        };
        let partial = OrderItemView::from(row(5));
        assert_eq!(partial.progress.pending, 3);
        assert!(!partial.complete);
        assert!(OrderItemView::from(row(9)).complete);
    }
}
