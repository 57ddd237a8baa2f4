//! Intake (ingreso) batches: registering incoming stock, editing it and
//! browsing the history

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::config::DisplayZone;
use crate::error::{AppError, AppResult};
use crate::services::audit;
use crate::services::catalog::{
    self, apply_edit_plan, describe, entry_views, find_or_create_product, load_entries,
    lock_stock, product_label, BatchEditSummary, EntryTable, EntryView, Product,
};
use shared::stock::{plan_batch_edit, plan_intake, LineEdit, StockLedger};
use shared::{
    validate_positive_quantity, CreateIngresoInput, DateRange, EditIngresoInput,
    IngresoHistoryQuery,
};

/// Intake service
#[derive(Clone)]
pub struct IngresoService {
    db: PgPool,
}

/// One registered intake line
#[derive(Debug, Clone, Serialize)]
pub struct IntakeLine {
    pub entry_id: i64,
    pub product_id: i64,
    pub name: String,
    pub brand: String,
    pub quantity: i32,
    /// Product stock after this line
    pub stock: i32,
    pub new_product: bool,
}

/// Result of registering an intake batch
#[derive(Debug, Clone, Serialize)]
pub struct IngresoCreated {
    pub batch_id: i64,
    pub items: Vec<IntakeLine>,
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: i64,
    operator: String,
    created_at: DateTime<Utc>,
}

/// Intake batch with its lines
#[derive(Debug, Clone, Serialize)]
pub struct IngresoBatch {
    pub id: i64,
    pub operator: String,
    pub created_at: DateTime<Utc>,
    pub date: String,
    pub total_units: i64,
    pub items: Vec<EntryView>,
}

fn quantity_error(line: usize, msg: &str) -> AppError {
    AppError::validation(
        format!("items[{}]", line),
        format!("Line {}: {}", line, msg),
        format!("Línea {}: la cantidad debe ser un entero válido", line),
    )
}

impl IngresoService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register incoming stock. Unknown products are created on the fly.
    pub async fn create_batch(&self, user_id: i64, input: CreateIngresoInput) -> AppResult<IngresoCreated> {
        let items = input.into_items();
        if items.is_empty() {
            return Err(AppError::validation(
                "items",
                "At least one item is required",
                "Debe ingresar al menos un producto",
            ));
        }

        let mut labels = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let line = idx + 1;
            let label = product_label(line, &item.name, &item.brand)?;
            validate_positive_quantity(item.quantity).map_err(|msg| quantity_error(line, msg))?;
            labels.push(label);
        }

        let mut tx = self.db.begin().await?;

        let batch_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO ingreso_batches (user_id) VALUES ($1) RETURNING id",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut products: Vec<(Product, bool)> = Vec::with_capacity(labels.len());
        for (name, brand) in &labels {
            products.push(find_or_create_product(&mut tx, name, brand).await?);
        }

        let ids: Vec<i64> = products.iter().map(|(p, _)| p.id).collect();
        let mut ledger = StockLedger::new();
        lock_stock(&mut tx, &mut ledger, &ids).await?;

        let mut lines = Vec::with_capacity(items.len());
        for (idx, (item, (product, created))) in items.iter().zip(products).enumerate() {
            let stock = plan_intake(&mut ledger, idx + 1, product.id, item.quantity)?;

            let entry_id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO inventory_entries (ingreso_id, product_id, quantity)
                VALUES ($1, $2, $3)
                RETURNING id
                "#,
            )
            .bind(batch_id)
            .bind(product.id)
            .bind(item.quantity)
            .fetch_one(&mut *tx)
            .await?;

            audit::record(
                &mut tx,
                user_id,
                "ingreso_producto",
                "inventory_entries",
                entry_id,
                format!("Ingreso {}: {} x{}", batch_id, describe(&product), item.quantity),
            )
            .await?;

            lines.push(IntakeLine {
                entry_id,
                product_id: product.id,
                name: product.name,
                brand: product.brand,
                quantity: item.quantity,
                stock,
                new_product: created,
            });
        }

        catalog::write_stock(&mut tx, &ledger.changes()).await?;

        audit::record(
            &mut tx,
            user_id,
            "create_ingreso_batch",
            "ingreso_batches",
            batch_id,
            format!("Ingreso {} con {} productos", batch_id, lines.len()),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(batch_id, items = lines.len(), "Ingreso batch registered");
        Ok(IngresoCreated { batch_id, items: lines })
    }

    /// One batch with its lines
    pub async fn get_batch(&self, batch_id: i64, zone: DisplayZone) -> AppResult<IngresoBatch> {
        let row = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT b.id, u.username AS operator, b.created_at
            FROM ingreso_batches b
            JOIN users u ON u.id = b.user_id
            WHERE b.id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ingreso".to_string()))?;

        let mut batches = self.attach_entries(vec![row], zone).await?;
        batches
            .pop()
            .ok_or_else(|| AppError::NotFound("Ingreso".to_string()))
    }

    /// Rewrite a batch's lines and reconcile stock
    pub async fn edit_batch(
        &self,
        user_id: i64,
        batch_id: i64,
        input: EditIngresoInput,
    ) -> AppResult<BatchEditSummary> {
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "At least one item is required",
                "Debe haber al menos un producto",
            ));
        }

        let mut labels = Vec::with_capacity(input.items.len());
        for (idx, item) in input.items.iter().enumerate() {
            let line = idx + 1;
            let label = product_label(line, &item.name, &item.brand)?;
            let quantity = item.edit_quantity().map_err(|msg| quantity_error(line, msg))?;
            labels.push((label, quantity));
        }

        let mut tx = self.db.begin().await?;

        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM ingreso_batches WHERE id = $1 FOR UPDATE")
            .bind(batch_id)
            .fetch_optional(&mut *tx)
            .await?;
        if found.is_none() {
            return Err(AppError::NotFound("Ingreso".to_string()));
        }

        let existing = load_entries(&mut tx, EntryTable::Inventory, batch_id).await?;

        let mut edits = Vec::with_capacity(labels.len());
        for (item, ((name, brand), quantity)) in input.items.iter().zip(&labels) {
            let (product, _) = find_or_create_product(&mut tx, name, brand).await?;
            edits.push(LineEdit {
                entry_id: item.entry_id,
                product_id: product.id,
                quantity: *quantity,
            });
        }

        let ids: Vec<i64> = edits
            .iter()
            .map(|e| e.product_id)
            .chain(existing.iter().map(|e| e.product_id))
            .collect();
        let mut ledger = StockLedger::new();
        lock_stock(&mut tx, &mut ledger, &ids).await?;

        let plan = plan_batch_edit(EntryTable::Inventory.movement(), &mut ledger, &existing, &edits)?;
        apply_edit_plan(&mut tx, EntryTable::Inventory, batch_id, &plan).await?;

        let summary = BatchEditSummary::new(batch_id, &plan);
        audit::record(
            &mut tx,
            user_id,
            "edit_ingreso_batch",
            "ingreso_batches",
            batch_id,
            format!(
                "Editado ingreso {}: {} actualizados, {} nuevos, {} eliminados",
                batch_id, summary.updated, summary.inserted, summary.deleted
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(batch_id, items = edits.len(), "Ingreso batch edited");
        Ok(summary)
    }

    /// Intake history, newest first, optionally bounded by inclusive days
    pub async fn history(&self, query: &IngresoHistoryQuery, zone: DisplayZone) -> AppResult<Vec<IngresoBatch>> {
        let range = DateRange::parse(query.start.as_deref(), query.end.as_deref());
        let (start, end) = zone.bounds(&range);

        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT b.id, u.username AS operator, b.created_at
            FROM ingreso_batches b
            JOIN users u ON u.id = b.user_id
            WHERE ($1::timestamptz IS NULL OR b.created_at >= $1)
              AND ($2::timestamptz IS NULL OR b.created_at < $2)
            ORDER BY b.created_at DESC, b.id DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;

        self.attach_entries(rows, zone).await
    }

    async fn attach_entries(&self, rows: Vec<BatchRow>, zone: DisplayZone) -> AppResult<Vec<IngresoBatch>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut conn = self.db.acquire().await?;
        let mut entries = entry_views(&mut conn, EntryTable::Inventory, &ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = entries.remove(&row.id).unwrap_or_default();
                IngresoBatch {
                    id: row.id,
                    operator: row.operator,
                    date: zone.format(row.created_at),
                    created_at: row.created_at,
                    total_units: items.iter().map(|i| i64::from(i.quantity)).sum(),
                    items,
                }
            })
            .collect())
    }
}
