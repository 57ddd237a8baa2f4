//! Dispatch (despacho) batches: outgoing stock to clients, edits, history
//! and the delivery photos attached to each batch

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::config::{DisplayZone, UploadConfig};
use crate::error::{AppError, AppResult};
use crate::services::audit;
use crate::services::catalog::{
    apply_edit_plan, describe, entry_views, find_or_create_client, load_entries, lock_stock,
    product_label, require_product, write_stock, BatchEditSummary, Client, EntryTable, EntryView,
    Product,
};
use shared::stock::{plan_batch_edit, plan_dispatch, LineEdit, StockLedger};
use shared::text::{clean_optional, clean_text, filter_pattern};
use shared::{
    allowed_extension, validate_client_name, validate_order_number,
    validate_positive_quantity, CreateDispatchInput, DateRange, DispatchHistoryQuery,
    EditDispatchInput, PhotoStage,
};

/// Dispatch service
#[derive(Clone)]
pub struct DispatchService {
    db: PgPool,
}

/// One dispatched line as registered
#[derive(Debug, Clone, Serialize)]
pub struct DispatchedLine {
    pub entry_id: i64,
    pub product_id: i64,
    pub name: String,
    pub brand: String,
    pub requested: i32,
    pub dispatched: i32,
    /// Product stock after this line
    pub stock: i32,
}

/// Result of registering a dispatch batch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchCreated {
    pub batch_id: i64,
    pub client: Client,
    pub order_number: Option<String>,
    pub items: Vec<DispatchedLine>,
    pub warnings: Vec<String>,
}

/// Result of editing a dispatch batch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchEdited {
    #[serde(flatten)]
    pub summary: BatchEditSummary,
    pub warnings: Vec<String>,
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: i64,
    client_id: i64,
    client: String,
    operator: String,
    order_number: Option<String>,
    created_at: DateTime<Utc>,
}

/// Dispatch batch with its lines
#[derive(Debug, Clone, Serialize)]
pub struct DispatchBatch {
    pub id: i64,
    pub client_id: i64,
    pub client: String,
    pub operator: String,
    pub order_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub date: String,
    pub total_units: i64,
    pub items: Vec<EntryView>,
}

#[derive(Debug, FromRow)]
struct PhotoRow {
    id: i64,
    batch_id: i64,
    stage: String,
    path: String,
    created_at: DateTime<Utc>,
}

/// Stored delivery photo
#[derive(Debug, Clone, Serialize)]
pub struct DispatchPhoto {
    pub id: i64,
    pub batch_id: i64,
    pub stage: String,
    /// File name inside the upload directory
    pub path: String,
    /// Public URL under `/uploads`
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<PhotoRow> for DispatchPhoto {
    fn from(row: PhotoRow) -> Self {
        Self {
            url: format!("/uploads/{}", row.path),
            id: row.id,
            batch_id: row.batch_id,
            stage: row.stage,
            path: row.path,
            created_at: row.created_at,
        }
    }
}

/// Selection of dispatch batches
#[derive(Debug, Default)]
struct BatchFilter {
    batch_id: Option<i64>,
    order_number: Option<String>,
    operator: Option<String>,
    client: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

/// Cleaned client name and optional order tag of a dispatch form
fn header_fields(client: &str, order_number: Option<&str>) -> AppResult<(String, Option<String>)> {
    let client = clean_text(client);
    validate_client_name(&client)
        .map_err(|msg| AppError::validation("client", msg, "Debe indicar un cliente válido"))?;

    let order_number = clean_optional(order_number);
    if let Some(number) = &order_number {
        validate_order_number(number)
            .map_err(|msg| AppError::validation("order_number", msg, "Número de orden no válido"))?;
    }
    Ok((client, order_number))
}

fn quantity_error(line: usize, msg: &str) -> AppError {
    AppError::validation(
        format!("items[{}]", line),
        format!("Line {}: {}", line, msg),
        format!("Línea {}: la cantidad debe ser un entero válido", line),
    )
}

/// Warning when a dispatch is tagged with a number no order carries
async fn order_warning(conn: &mut PgConnection, order_number: Option<&str>) -> AppResult<Option<String>> {
    let Some(number) = order_number else {
        return Ok(None);
    };
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM purchase_orders WHERE number = $1)")
        .bind(number)
        .fetch_one(&mut *conn)
        .await?;
    Ok((!exists).then(|| format!("La orden de compra {} no existe", number)))
}

/// Name of a stored photo: batch, stage and upload instant keep it unique
fn photo_file_name(batch_id: i64, stage: PhotoStage, at: DateTime<Utc>, ext: &str) -> String {
    format!(
        "dispatch_{}_{}_{}.{}",
        batch_id,
        stage.as_str(),
        at.format("%Y%m%d%H%M%S%3f"),
        ext
    )
}

impl DispatchService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register outgoing stock. Lines are clamped to the stock on hand and
    /// shortfalls are reported as warnings.
    pub async fn create_batch(&self, user_id: i64, input: CreateDispatchInput) -> AppResult<DispatchCreated> {
        let (client_name, order_number) = header_fields(&input.client, input.order_number.as_deref())?;
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "At least one item is required",
                "Debe despachar al menos un producto",
            ));
        }

        let mut labels = Vec::with_capacity(input.items.len());
        for (idx, item) in input.items.iter().enumerate() {
            let line = idx + 1;
            let label = product_label(line, &item.name, &item.brand)?;
            validate_positive_quantity(item.quantity).map_err(|msg| quantity_error(line, msg))?;
            labels.push(label);
        }

        let mut tx = self.db.begin().await?;

        let client = find_or_create_client(&mut tx, &client_name).await?;

        let mut products: Vec<Product> = Vec::with_capacity(labels.len());
        for (idx, (name, brand)) in labels.iter().enumerate() {
            products.push(require_product(&mut tx, idx + 1, name, brand).await?);
        }

        let batch_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO dispatch_batches (client_id, user_id, order_number)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(client.id)
        .bind(user_id)
        .bind(&order_number)
        .fetch_one(&mut *tx)
        .await?;

        let ids: Vec<i64> = products.iter().map(|p| p.id).collect();
        let mut ledger = StockLedger::new();
        lock_stock(&mut tx, &mut ledger, &ids).await?;

        let mut lines = Vec::with_capacity(products.len());
        let mut warnings = Vec::new();
        for (idx, (item, product)) in input.items.iter().zip(products).enumerate() {
            let outcome = plan_dispatch(&mut ledger, idx + 1, product.id, item.quantity)?;

            let entry_id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO dispatch_entries (batch_id, product_id, quantity)
                VALUES ($1, $2, $3)
                RETURNING id
                "#,
            )
            .bind(batch_id)
            .bind(product.id)
            .bind(outcome.dispatched)
            .fetch_one(&mut *tx)
            .await?;

            audit::record(
                &mut tx,
                user_id,
                "dispatch_product",
                "dispatch_entries",
                entry_id,
                format!(
                    "Despacho {}: {} x{} a {}",
                    batch_id,
                    describe(&product),
                    outcome.dispatched,
                    client.name
                ),
            )
            .await?;

            if let Some(missing) = outcome.shortfall() {
                warnings.push(format!(
                    "{}: solicitado {}, despachado {} (faltan {})",
                    describe(&product),
                    outcome.requested,
                    outcome.dispatched,
                    missing
                ));
            }

            lines.push(DispatchedLine {
                entry_id,
                product_id: product.id,
                name: product.name,
                brand: product.brand,
                requested: outcome.requested,
                dispatched: outcome.dispatched,
                stock: ledger.get(outcome.product_id).unwrap_or_default(),
            });
        }

        write_stock(&mut tx, &ledger.changes()).await?;

        if let Some(warning) = order_warning(&mut tx, order_number.as_deref()).await? {
            warnings.push(warning);
        }

        audit::record(
            &mut tx,
            user_id,
            "create_dispatch_batch",
            "dispatch_batches",
            batch_id,
            format!(
                "Despacho {} a {} con {} productos{}",
                batch_id,
                client.name,
                lines.len(),
                order_number
                    .as_deref()
                    .map(|n| format!(" (orden {})", n))
                    .unwrap_or_default()
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(batch_id, items = lines.len(), warnings = warnings.len(), "Dispatch batch registered");
        Ok(DispatchCreated {
            batch_id,
            client,
            order_number,
            items: lines,
            warnings,
        })
    }

    pub async fn get_batch(&self, batch_id: i64, zone: DisplayZone) -> AppResult<DispatchBatch> {
        let filter = BatchFilter {
            batch_id: Some(batch_id),
            ..Default::default()
        };
        self.load_batches(filter, zone)
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound("Dispatch".to_string()))
    }

    /// Rewrite a batch's header and lines. New lines must be fully covered
    /// by stock; edited and removed lines are reconciled against it.
    pub async fn edit_batch(
        &self,
        user_id: i64,
        batch_id: i64,
        input: EditDispatchInput,
    ) -> AppResult<DispatchEdited> {
        let (client_name, order_number) = header_fields(&input.client, input.order_number.as_deref())?;
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

        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM dispatch_batches WHERE id = $1 FOR UPDATE")
            .bind(batch_id)
            .fetch_optional(&mut *tx)
            .await?;
        if found.is_none() {
            return Err(AppError::NotFound("Dispatch".to_string()));
        }

        let client = find_or_create_client(&mut tx, &client_name).await?;
        let existing = load_entries(&mut tx, EntryTable::Dispatch, batch_id).await?;

        let mut edits = Vec::with_capacity(labels.len());
        for (idx, (item, ((name, brand), quantity))) in input.items.iter().zip(&labels).enumerate() {
            let product = require_product(&mut tx, idx + 1, name, brand).await?;
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

        let plan = plan_batch_edit(EntryTable::Dispatch.movement(), &mut ledger, &existing, &edits)?;
        apply_edit_plan(&mut tx, EntryTable::Dispatch, batch_id, &plan).await?;

        sqlx::query("UPDATE dispatch_batches SET client_id = $2, order_number = $3 WHERE id = $1")
            .bind(batch_id)
            .bind(client.id)
            .bind(&order_number)
            .execute(&mut *tx)
            .await?;

        let warnings: Vec<String> = order_warning(&mut tx, order_number.as_deref())
            .await?
            .into_iter()
            .collect();

        let summary = BatchEditSummary::new(batch_id, &plan);
        audit::record(
            &mut tx,
            user_id,
            "edit_dispatch_batch",
            "dispatch_batches",
            batch_id,
            format!(
                "Editado despacho {} (cliente {}): {} actualizados, {} nuevos, {} eliminados",
                batch_id, client.name, summary.updated, summary.inserted, summary.deleted
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(batch_id, items = edits.len(), "Dispatch batch edited");
        Ok(DispatchEdited { summary, warnings })
    }

    /// Dispatch history, newest first
    pub async fn history(&self, query: &DispatchHistoryQuery, zone: DisplayZone) -> AppResult<Vec<DispatchBatch>> {
        let range = DateRange::parse(query.start.as_deref(), query.end.as_deref());
        let (start, end) = zone.bounds(&range);
        let filter = BatchFilter {
            operator: filter_pattern(query.operator.as_deref()),
            client: filter_pattern(query.client.as_deref()),
            start,
            end,
            ..Default::default()
        };
        self.load_batches(filter, zone).await
    }

    /// Batches tagged with an order number, newest first
    pub async fn batches_for_order(&self, order_number: &str, zone: DisplayZone) -> AppResult<Vec<DispatchBatch>> {
        let filter = BatchFilter {
            order_number: Some(order_number.to_string()),
            ..Default::default()
        };
        self.load_batches(filter, zone).await
    }

    async fn load_batches(&self, filter: BatchFilter, zone: DisplayZone) -> AppResult<Vec<DispatchBatch>> {
        let mut conn = self.db.acquire().await?;

        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT b.id, b.client_id, c.name AS client, u.username AS operator,
                   b.order_number, b.created_at
            FROM dispatch_batches b
            JOIN clients c ON c.id = b.client_id
            JOIN users u ON u.id = b.user_id
            WHERE ($1::bigint IS NULL OR b.id = $1)
              AND ($2::text IS NULL OR b.order_number = $2)
              AND ($3::text IS NULL OR u.username ILIKE $3)
              AND ($4::text IS NULL OR c.name ILIKE $4)
              AND ($5::timestamptz IS NULL OR b.created_at >= $5)
              AND ($6::timestamptz IS NULL OR b.created_at < $6)
            ORDER BY b.created_at DESC, b.id DESC
            "#,
        )
        .bind(filter.batch_id)
        .bind(&filter.order_number)
        .bind(&filter.operator)
        .bind(&filter.client)
        .bind(filter.start)
        .bind(filter.end)
        .fetch_all(&mut *conn)
        .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut entries = entry_views(&mut conn, EntryTable::Dispatch, &ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = entries.remove(&row.id).unwrap_or_default();
                DispatchBatch {
                    id: row.id,
                    client_id: row.client_id,
                    client: row.client,
                    operator: row.operator,
                    order_number: row.order_number,
                    date: zone.format(row.created_at),
                    created_at: row.created_at,
                    total_units: items.iter().map(|i| i64::from(i.quantity)).sum(),
                    items,
                }
            })
            .collect())
    }

    // ========================================================================
    // Photos
    // ========================================================================

    async fn ensure_batch(&self, batch_id: i64) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM dispatch_batches WHERE id = $1)")
            .bind(batch_id)
            .fetch_one(&self.db)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(AppError::NotFound("Dispatch".to_string()))
        }
    }

    pub async fn list_photos(&self, batch_id: i64) -> AppResult<Vec<DispatchPhoto>> {
        self.ensure_batch(batch_id).await?;
        let mut photos = self.photos_for(&[batch_id]).await?;
        Ok(photos.remove(&batch_id).unwrap_or_default())
    }

    /// Photos of the given batches, salida before entrega, oldest first
    pub async fn photos_for(&self, batch_ids: &[i64]) -> AppResult<HashMap<i64, Vec<DispatchPhoto>>> {
        let mut grouped: HashMap<i64, Vec<DispatchPhoto>> = HashMap::new();
        if batch_ids.is_empty() {
            return Ok(grouped);
        }

        let rows = sqlx::query_as::<_, PhotoRow>(
            r#"
            SELECT id, batch_id, stage, path, created_at
            FROM dispatch_photos
            WHERE batch_id = ANY($1)
            ORDER BY CASE stage WHEN 'salida' THEN 0 ELSE 1 END, created_at, id
            "#,
        )
        .bind(batch_ids)
        .fetch_all(&self.db)
        .await?;

        for row in rows {
            grouped.entry(row.batch_id).or_default().push(row.into());
        }
        Ok(grouped)
    }

    /// Store an uploaded photo and record it. The file is removed again if
    /// the database write fails.
    pub async fn add_photo(
        &self,
        user_id: i64,
        batch_id: i64,
        stage: PhotoStage,
        file_name: &str,
        data: &[u8],
        uploads: &UploadConfig,
    ) -> AppResult<DispatchPhoto> {
        let ext = allowed_extension(file_name, &uploads.allowed_extensions).ok_or_else(|| {
            AppError::Upload(format!(
                "File type not allowed; accepted: {}",
                uploads.allowed_extensions.join(", ")
            ))
        })?;
        if data.is_empty() {
            return Err(AppError::Upload("Empty file".to_string()));
        }
        self.ensure_batch(batch_id).await?;

        let stored_name = photo_file_name(batch_id, stage, Utc::now(), &ext);
        let dir = PathBuf::from(&uploads.dir);
        let full_path = dir.join(&stored_name);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::StorageError(format!("cannot create upload dir: {}", e)))?;
        tokio::fs::write(&full_path, data)
            .await
            .map_err(|e| AppError::StorageError(format!("cannot write photo: {}", e)))?;

        match self.insert_photo(user_id, batch_id, stage, &stored_name).await {
            Ok(photo) => Ok(photo),
            Err(e) => {
                remove_file(&full_path).await;
                Err(e)
            }
        }
    }

    async fn insert_photo(
        &self,
        user_id: i64,
        batch_id: i64,
        stage: PhotoStage,
        stored_name: &str,
    ) -> AppResult<DispatchPhoto> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, PhotoRow>(
            r#"
            INSERT INTO dispatch_photos (batch_id, stage, path)
            VALUES ($1, $2, $3)
            RETURNING id, batch_id, stage, path, created_at
            "#,
        )
        .bind(batch_id)
        .bind(stage.as_str())
        .bind(stored_name)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            user_id,
            "upload_dispatch_photo",
            "dispatch_photos",
            row.id,
            format!("Foto {} del despacho {}: {}", stage.as_str(), batch_id, stored_name),
        )
        .await?;
        tx.commit().await?;

        Ok(row.into())
    }

    /// Delete a photo record and its file
    pub async fn delete_photo(
        &self,
        user_id: i64,
        batch_id: i64,
        photo_id: i64,
        uploads: &UploadConfig,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, PhotoRow>(
            r#"
            DELETE FROM dispatch_photos
            WHERE id = $1 AND batch_id = $2
            RETURNING id, batch_id, stage, path, created_at
            "#,
        )
        .bind(photo_id)
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Photo".to_string()))?;

        audit::record(
            &mut tx,
            user_id,
            "delete_dispatch_photo",
            "dispatch_photos",
            row.id,
            format!("Foto {} eliminada del despacho {}: {}", row.stage, batch_id, row.path),
        )
        .await?;
        tx.commit().await?;

        remove_file(&Path::new(&uploads.dir).join(&row.path)).await;
        Ok(())
    }
}

async fn remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_photo_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 14, 3, 9).unwrap();
        assert_eq!(
            photo_file_name(12, PhotoStage::Entrega, at, "jpg"),
            "dispatch_12_entrega_20240501140309000.jpg"
        );
    }

    #[test]
    fn test_header_fields() {
        let (client, order) = header_fields(" Constructora Sur ", Some("  ")).unwrap();
        assert_eq!(client, "Constructora Sur");
        assert_eq!(order, None);

        let (_, order) = header_fields("A", Some(" OC-77 ")).unwrap();
        assert_eq!(order.as_deref(), Some("OC-77"));

        assert!(header_fields("  ", None).is_err());
        assert!(header_fields("A", Some(&"9".repeat(60))).is_err());
    }

    #[test]
    fn test_photo_url() {
        let photo: DispatchPhoto = PhotoRow {
            id: 1,
            batch_id: 2,
            stage: "salida".to_string(),
            path: "dispatch_2_salida_1.png".to_string(),
            created_at: Utc::now(),
        }
        .into();
        assert_eq!(photo.url, "/uploads/dispatch_2_salida_1.png");
    }
}
