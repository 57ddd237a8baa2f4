//! Product catalogue maintenance: listing, corrections, reference cleanup,
//! deletion and merging of duplicates

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::error::{AppError, AppResult};
use crate::services::audit;
use crate::services::catalog::{describe, get_product, lock_stock, write_stock, Product};
use shared::stock::{merge_stock, plan_reference_removal, ExistingLine, Movement, StockChange, StockLedger};
use shared::text::{clean_optional, clean_text, contains_pattern};
use shared::{
    validate_product_label, validate_stock, DeleteReferencesInput, MergeProductsInput,
    ProductUsage, UpdateProductInput,
};

/// Autocomplete returns at most this many products
const SUGGEST_LIMIT: i64 = 10;

/// Product service
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Reference counts of one product
#[derive(Debug, Clone, Serialize)]
pub struct ProductUsageReport {
    pub product: Product,
    pub usage: ProductUsage,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IntakeReference {
    pub id: i64,
    pub batch_id: i64,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DispatchReference {
    pub id: i64,
    pub batch_id: i64,
    pub client: String,
    pub order_number: Option<String>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItemReference {
    pub id: i64,
    pub order_id: i64,
    pub order_number: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Every row that points at a product
#[derive(Debug, Clone, Serialize)]
pub struct ProductReferences {
    pub product: Product,
    pub inventory_entries: Vec<IntakeReference>,
    pub dispatch_entries: Vec<DispatchReference>,
    pub purchase_order_items: Vec<OrderItemReference>,
}

/// What a reference purge removed
#[derive(Debug, Clone, Serialize)]
pub struct DeletedReferences {
    pub inventory_entries: u64,
    pub dispatch_entries: u64,
    pub purchase_order_items: u64,
    pub stock: Vec<StockChange>,
}

/// Result of merging products
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub target: Product,
    pub merged: Vec<i64>,
}

async fn usage_of(conn: &mut PgConnection, product_id: i64) -> AppResult<ProductUsage> {
    let (inventory, dispatch, order_items) = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM inventory_entries WHERE product_id = $1),
            (SELECT COUNT(*) FROM dispatch_entries WHERE product_id = $1),
            (SELECT COUNT(*) FROM purchase_order_items WHERE product_id = $1)
        "#,
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(ProductUsage::new(inventory, dispatch, order_items))
}

/// Entries of `table` with the given ids that belong to `product_id`
async fn owned_lines(
    conn: &mut PgConnection,
    table: &str,
    ids: &[i64],
    product_id: i64,
) -> AppResult<Vec<ExistingLine>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, (i64, i64, i32)>(&format!(
        "SELECT id, product_id, quantity FROM {} WHERE id = ANY($1) AND product_id = $2 ORDER BY id FOR UPDATE",
        table
    ))
    .bind(ids)
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(entry_id, product_id, quantity)| ExistingLine {
            entry_id,
            product_id,
            quantity,
        })
        .collect())
}

/// Source ids without duplicates, in submission order
fn dedup_sources(sources: &[i64]) -> Vec<i64> {
    let mut seen = BTreeSet::new();
    sources.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All products ordered by id
    pub async fn list_products(&self) -> AppResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT id, name, brand, stock FROM products ORDER BY id")
            .fetch_all(&self.db)
            .await?;
        Ok(products)
    }

    /// Autocomplete by name substring
    pub async fn suggest(&self, q: &str) -> AppResult<Vec<Product>> {
        let q = clean_text(q);
        if q.is_empty() {
            return Ok(Vec::new());
        }

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, brand, stock
            FROM products
            WHERE name ILIKE $1
            ORDER BY name, id
            LIMIT $2
            "#,
        )
        .bind(contains_pattern(&q))
        .bind(SUGGEST_LIMIT)
        .fetch_all(&self.db)
        .await?;
        Ok(products)
    }

    /// Overwrite label and stock of a product (administrators only)
    pub async fn update_product(
        &self,
        user_id: i64,
        product_id: i64,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        let name = clean_text(&input.name);
        let brand = clean_text(&input.brand);
        validate_product_label(&name, &brand)
            .map_err(|msg| AppError::validation("name", msg, "Producto y marca son obligatorios"))?;
        if let Some(stock) = input.stock {
            validate_stock(stock).map_err(|msg| {
                AppError::validation("stock", msg, "El stock debe ser un entero mayor o igual a 0")
            })?;
        }

        let mut tx = self.db.begin().await?;
        let before = sqlx::query_as::<_, Product>(
            "SELECT id, name, brand, stock FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let stock = input.stock.unwrap_or(before.stock);
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET name = $2, brand = $3, stock = $4
            WHERE id = $1
            RETURNING id, name, brand, stock
            "#,
        )
        .bind(product_id)
        .bind(&name)
        .bind(&brand)
        .bind(stock)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            user_id,
            "update_product_stock",
            "products",
            product_id,
            format!(
                "{} (stock {}) -> {} (stock {})",
                describe(&before),
                before.stock,
                describe(&product),
                product.stock
            ),
        )
        .await?;
        tx.commit().await?;

        Ok(product)
    }

    pub async fn usage(&self, product_id: i64) -> AppResult<ProductUsageReport> {
        let mut conn = self.db.acquire().await?;
        let product = get_product(&mut conn, product_id).await?;
        let usage = usage_of(&mut conn, product_id).await?;
        Ok(ProductUsageReport { product, usage })
    }

    /// Detailed references with their batch, client and order
    pub async fn references(&self, product_id: i64) -> AppResult<ProductReferences> {
        let mut conn = self.db.acquire().await?;
        let product = get_product(&mut conn, product_id).await?;

        let inventory_entries = sqlx::query_as::<_, IntakeReference>(
            r#"
            SELECT e.id, e.ingreso_id AS batch_id, e.quantity, b.created_at
            FROM inventory_entries e
            JOIN ingreso_batches b ON b.id = e.ingreso_id
            WHERE e.product_id = $1
            ORDER BY b.created_at DESC, e.id DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        let dispatch_entries = sqlx::query_as::<_, DispatchReference>(
            r#"
            SELECT e.id, e.batch_id, c.name AS client, b.order_number, e.quantity, b.created_at
            FROM dispatch_entries e
            JOIN dispatch_batches b ON b.id = e.batch_id
            JOIN clients c ON c.id = b.client_id
            WHERE e.product_id = $1
            ORDER BY b.created_at DESC, e.id DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        let purchase_order_items = sqlx::query_as::<_, OrderItemReference>(
            r#"
            SELECT i.id, i.order_id, o.number AS order_number, i.quantity, o.created_at
            FROM purchase_order_items i
            JOIN purchase_orders o ON o.id = i.order_id
            WHERE i.product_id = $1
            ORDER BY o.created_at DESC, i.id DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(ProductReferences {
            product,
            inventory_entries,
            dispatch_entries,
            purchase_order_items,
        })
    }

    /// Delete selected references of a product, reverting their stock effect
    pub async fn delete_references(
        &self,
        user_id: i64,
        product_id: i64,
        input: DeleteReferencesInput,
    ) -> AppResult<DeletedReferences> {
        if input.is_empty() {
            return Err(AppError::validation(
                "references",
                "No references selected",
                "No se seleccionaron referencias",
            ));
        }

        let mut tx = self.db.begin().await?;
        let mut ledger = StockLedger::new();
        lock_stock(&mut tx, &mut ledger, &[product_id]).await?;

        let intake = owned_lines(&mut tx, "inventory_entries", &input.inventory_entry_ids, product_id).await?;
        let dispatch = owned_lines(&mut tx, "dispatch_entries", &input.dispatch_entry_ids, product_id).await?;

        // Restored dispatches first so intake removals see the returned units
        plan_reference_removal(Movement::Dispatch, &mut ledger, &dispatch)?;
        let stock = plan_reference_removal(Movement::Intake, &mut ledger, &intake)?;

        let intake_ids: Vec<i64> = intake.iter().map(|l| l.entry_id).collect();
        let dispatch_ids: Vec<i64> = dispatch.iter().map(|l| l.entry_id).collect();

        let inventory_entries = sqlx::query("DELETE FROM inventory_entries WHERE id = ANY($1)")
            .bind(&intake_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let dispatch_entries = sqlx::query("DELETE FROM dispatch_entries WHERE id = ANY($1)")
            .bind(&dispatch_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let purchase_order_items = sqlx::query(
            "DELETE FROM purchase_order_items WHERE id = ANY($1) AND product_id = $2",
        )
        .bind(&input.purchase_order_item_ids)
        .bind(product_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        write_stock(&mut tx, &stock).await?;

        audit::record(
            &mut tx,
            user_id,
            "delete_product_refs",
            "products",
            product_id,
            format!(
                "Referencias eliminadas: ingresos={}, despachos={}, items OC={}",
                inventory_entries, dispatch_entries, purchase_order_items
            ),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(product_id, inventory_entries, dispatch_entries, purchase_order_items, "Product references deleted");
        Ok(DeletedReferences {
            inventory_entries,
            dispatch_entries,
            purchase_order_items,
            stock,
        })
    }

    /// Delete a product that nothing references
    pub async fn delete_product(&self, user_id: i64, product_id: i64) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, name, brand, stock FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let usage = usage_of(&mut tx, product_id).await?;
        if usage.is_referenced() {
            return Err(AppError::ProductInUse { product_id, usage });
        }

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            user_id,
            "delete_product",
            "products",
            product_id,
            format!("Producto eliminado: {}", describe(&product)),
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Fold duplicate products into a target: references are re-pointed,
    /// stock is summed and the sources are deleted
    pub async fn merge_products(&self, user_id: i64, input: MergeProductsInput) -> AppResult<MergeOutcome> {
        let sources = dedup_sources(&input.sources);
        if sources.is_empty() {
            return Err(AppError::validation(
                "sources",
                "Select at least one product to merge",
                "Seleccione al menos un producto a fusionar",
            ));
        }
        if sources.contains(&input.target_id) {
            return Err(AppError::validation(
                "sources",
                "The target cannot be one of the sources",
                "El producto destino no puede estar entre los productos a fusionar",
            ));
        }

        let mut tx = self.db.begin().await?;

        let mut all_ids = sources.clone();
        all_ids.push(input.target_id);
        let locked = sqlx::query_as::<_, Product>(
            "SELECT id, name, brand, stock FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&all_ids)
        .fetch_all(&mut *tx)
        .await?;
        if locked.len() != all_ids.len() {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let target = locked
            .iter()
            .find(|p| p.id == input.target_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        let source_rows: Vec<&Product> = locked.iter().filter(|p| p.id != target.id).collect();

        let stock = merge_stock(
            (target.id, target.stock),
            &source_rows.iter().map(|p| (p.id, p.stock)).collect::<Vec<_>>(),
        )?;

        for table in ["inventory_entries", "dispatch_entries", "purchase_order_items"] {
            sqlx::query(&format!(
                "UPDATE {} SET product_id = $1 WHERE product_id = ANY($2)",
                table
            ))
            .bind(target.id)
            .bind(&sources)
            .execute(&mut *tx)
            .await?;
        }

        let name = clean_optional(input.new_name.as_deref()).unwrap_or_else(|| target.name.clone());
        let brand = clean_optional(input.new_brand.as_deref()).unwrap_or_else(|| target.brand.clone());
        validate_product_label(&name, &brand)
            .map_err(|msg| AppError::validation("new_name", msg, "Nombre o marca no válidos"))?;

        let merged = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET name = $2, brand = $3, stock = $4
            WHERE id = $1
            RETURNING id, name, brand, stock
            "#,
        )
        .bind(target.id)
        .bind(&name)
        .bind(&brand)
        .bind(stock)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM products WHERE id = ANY($1)")
            .bind(&sources)
            .execute(&mut *tx)
            .await?;

        for source in &source_rows {
            let (target_id, details) = merge_log_entry(source, &merged);
            audit::record(&mut tx, user_id, "merge_product", "products", target_id, details).await?;
        }
        tx.commit().await?;

        tracing::info!(target_id = merged.id, sources = sources.len(), "Products merged");
        Ok(MergeOutcome {
            target: merged,
            merged: sources,
        })
    }
}

/// Log target (the surviving product) and details for one merged source
fn merge_log_entry(source: &Product, merged: &Product) -> (i64, String) {
    (
        merged.id,
        format!(
            "Fusionado {} (id {}, stock {}) en {} (id {})",
            describe(source),
            source.id,
            source.stock,
            describe(merged),
            merged.id
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_log_points_at_target() {
        let source = Product {
            id: 7,
            name: "Cemento".to_string(),
            brand: "Polpaico".to_string(),
            stock: 4,
        };
        let merged = Product {
            id: 2,
            name: "Cemento 25kg".to_string(),
            brand: "Polpaico".to_string(),
            stock: 12,
        };
        let (target_id, details) = merge_log_entry(&source, &merged);
        assert_eq!(target_id, 2);
        assert!(details.contains("(id 7, stock 4)"));
        assert!(details.ends_with("(id 2)"));
    }

    #[test]
    fn test_dedup_sources_keeps_order() {
        assert_eq!(dedup_sources(&[5, 3, 5, 9, 3]), vec![5, 3, 9]);
        assert!(dedup_sources(&[]).is_empty());
    }
}
