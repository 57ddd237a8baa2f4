//! Product and client lookups shared by the stock-moving services.
//!
//! Everything here runs on the caller's transaction so lookups, row locks
//! and the writes that follow them commit together.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use crate::error::{AppError, AppResult};
use shared::stock::{EditPlan, ExistingLine, Movement, StockChange, StockLedger};
use shared::text::{clean_text, contains_pattern};
use shared::validate_product_label;

/// Product row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub brand: String,
    pub stock: i32,
}

/// Client row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Client {
    pub id: i64,
    pub name: String,
}

/// Cleaned and validated product label of line `line` (1-based)
pub fn product_label(line: usize, name: &str, brand: &str) -> AppResult<(String, String)> {
    let name = clean_text(name);
    let brand = clean_text(brand);
    validate_product_label(&name, &brand).map_err(|msg| {
        AppError::validation(
            format!("items[{}]", line),
            format!("Line {}: {}", line, msg),
            format!("Línea {}: producto o marca no válidos", line),
        )
    })?;
    Ok((name, brand))
}

/// Find a product by name and brand.
///
/// Both fields match case-insensitively as substrings; an exact match on
/// both wins, then the lowest id.
pub async fn find_product(
    conn: &mut PgConnection,
    name: &str,
    brand: &str,
) -> AppResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        SELECT id, name, brand, stock
        FROM products
        WHERE name ILIKE $1 AND brand ILIKE $2
        ORDER BY (lower(name) = lower($3) AND lower(brand) = lower($4)) DESC, id
        LIMIT 1
        "#,
    )
    .bind(contains_pattern(name))
    .bind(contains_pattern(brand))
    .bind(name)
    .bind(brand)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(product)
}

/// Like [`find_product`] but a miss is a validation error on `line`
pub async fn require_product(
    conn: &mut PgConnection,
    line: usize,
    name: &str,
    brand: &str,
) -> AppResult<Product> {
    find_product(conn, name, brand).await?.ok_or_else(|| {
        AppError::validation(
            format!("items[{}]", line),
            format!("Line {}: product '{} - {}' does not exist", line, name, brand),
            format!("Línea {}: el producto '{} - {}' no existe", line, name, brand),
        )
    })
}

/// Find a product or create it with zero stock. Returns whether it was created.
pub async fn find_or_create_product(
    conn: &mut PgConnection,
    name: &str,
    brand: &str,
) -> AppResult<(Product, bool)> {
    if let Some(product) = find_product(conn, name, brand).await? {
        return Ok((product, false));
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (name, brand, stock)
        VALUES ($1, $2, 0)
        RETURNING id, name, brand, stock
        "#,
    )
    .bind(name)
    .bind(brand)
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(product_id = product.id, "Created product {} - {}", product.name, product.brand);
    Ok((product, true))
}

pub async fn get_product(conn: &mut PgConnection, product_id: i64) -> AppResult<Product> {
    sqlx::query_as::<_, Product>("SELECT id, name, brand, stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
}

/// Resolve a client by exact case-insensitive name, creating it if needed
pub async fn find_or_create_client(conn: &mut PgConnection, name: &str) -> AppResult<Client> {
    let existing = sqlx::query_as::<_, Client>(
        "SELECT id, name FROM clients WHERE lower(name) = lower($1) ORDER BY id LIMIT 1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(client) = existing {
        return Ok(client);
    }

    let client = sqlx::query_as::<_, Client>(
        "INSERT INTO clients (name) VALUES ($1) RETURNING id, name",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    Ok(client)
}

/// Lock product rows and seed their current stock into `ledger`.
/// Products already in the ledger are skipped.
pub async fn lock_stock(
    conn: &mut PgConnection,
    ledger: &mut StockLedger,
    product_ids: &[i64],
) -> AppResult<()> {
    let mut missing: Vec<i64> = product_ids
        .iter()
        .copied()
        .filter(|id| !ledger.contains(*id))
        .collect();
    missing.sort_unstable();
    missing.dedup();
    if missing.is_empty() {
        return Ok(());
    }

    let rows = sqlx::query_as::<_, (i64, i32)>(
        "SELECT id, stock FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&missing)
    .fetch_all(&mut *conn)
    .await?;

    if rows.len() != missing.len() {
        return Err(AppError::NotFound("Product".to_string()));
    }

    for (id, stock) in rows {
        ledger.insert(id, stock);
    }
    Ok(())
}

/// Persist the final stock of every product a plan touched
pub async fn write_stock(conn: &mut PgConnection, changes: &[StockChange]) -> AppResult<()> {
    for change in changes {
        sqlx::query("UPDATE products SET stock = $1 WHERE id = $2")
            .bind(change.stock)
            .bind(change.product_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Entry table of a batch kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTable {
    /// `inventory_entries`, lines of an ingreso
    Inventory,
    /// `dispatch_entries`, lines of a despacho
    Dispatch,
}

impl EntryTable {
    fn table(self) -> &'static str {
        match self {
            EntryTable::Inventory => "inventory_entries",
            EntryTable::Dispatch => "dispatch_entries",
        }
    }

    fn batch_column(self) -> &'static str {
        match self {
            EntryTable::Inventory => "ingreso_id",
            EntryTable::Dispatch => "batch_id",
        }
    }

    pub fn movement(self) -> Movement {
        match self {
            EntryTable::Inventory => Movement::Intake,
            EntryTable::Dispatch => Movement::Dispatch,
        }
    }
}

/// Batch line joined with its product
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EntryView {
    pub entry_id: i64,
    pub batch_id: i64,
    pub product_id: i64,
    pub name: String,
    pub brand: String,
    pub quantity: i32,
}

/// Counts of what a batch edit wrote
#[derive(Debug, Clone, Serialize)]
pub struct BatchEditSummary {
    pub batch_id: i64,
    pub updated: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub stock: Vec<StockChange>,
}

impl BatchEditSummary {
    pub fn new(batch_id: i64, plan: &EditPlan) -> Self {
        Self {
            batch_id,
            updated: plan.updates.len(),
            inserted: plan.inserts.len(),
            deleted: plan.deletes.len(),
            stock: plan.stock.clone(),
        }
    }
}

/// Lock and load the persisted lines of a batch
pub async fn load_entries(
    conn: &mut PgConnection,
    table: EntryTable,
    batch_id: i64,
) -> AppResult<Vec<ExistingLine>> {
    let rows = sqlx::query_as::<_, (i64, i64, i32)>(&format!(
        "SELECT id, product_id, quantity FROM {} WHERE {} = $1 ORDER BY id FOR UPDATE",
        table.table(),
        table.batch_column()
    ))
    .bind(batch_id)
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

/// Lines of the given batches with product labels, grouped by batch
pub async fn entry_views(
    conn: &mut PgConnection,
    table: EntryTable,
    batch_ids: &[i64],
) -> AppResult<HashMap<i64, Vec<EntryView>>> {
    let mut grouped: HashMap<i64, Vec<EntryView>> = HashMap::new();
    if batch_ids.is_empty() {
        return Ok(grouped);
    }

    let rows = sqlx::query_as::<_, EntryView>(&format!(
        r#"
        SELECT e.id AS entry_id, e.{col} AS batch_id, e.product_id, p.name, p.brand, e.quantity
        FROM {table} e
        JOIN products p ON p.id = e.product_id
        WHERE e.{col} = ANY($1)
        ORDER BY e.id
        "#,
        col = table.batch_column(),
        table = table.table()
    ))
    .bind(batch_ids)
    .fetch_all(&mut *conn)
    .await?;

    for row in rows {
        grouped.entry(row.batch_id).or_default().push(row);
    }
    Ok(grouped)
}

/// Write an edit plan: entry updates, inserts, deletes, then stock
pub async fn apply_edit_plan(
    conn: &mut PgConnection,
    table: EntryTable,
    batch_id: i64,
    plan: &EditPlan,
) -> AppResult<()> {
    if plan.is_noop() {
        return Ok(());
    }

    for update in &plan.updates {
        sqlx::query(&format!(
            "UPDATE {} SET product_id = $1, quantity = $2 WHERE id = $3",
            table.table()
        ))
        .bind(update.product_id)
        .bind(update.quantity)
        .bind(update.entry_id)
        .execute(&mut *conn)
        .await?;
    }

    for insert in &plan.inserts {
        sqlx::query(&format!(
            "INSERT INTO {} ({}, product_id, quantity) VALUES ($1, $2, $3)",
            table.table(),
            table.batch_column()
        ))
        .bind(batch_id)
        .bind(insert.product_id)
        .bind(insert.quantity)
        .execute(&mut *conn)
        .await?;
    }

    if !plan.deletes.is_empty() {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", table.table()))
            .bind(&plan.deletes)
            .execute(&mut *conn)
            .await?;
    }

    write_stock(conn, &plan.stock).await
}

/// `name - brand` label used in log details
pub fn describe(product: &Product) -> String {
    format!("{} - {}", product.name, product.brand)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_label_cleans_and_validates() {
        let (name, brand) = product_label(1, " <b>Cemento</b> ", "Polpaico ").unwrap();
        assert_eq!(name, "Cemento");
        assert_eq!(brand, "Polpaico");

        match product_label(3, "Cemento", "  ") {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "items[3]"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_entry_tables() {
        assert_eq!(EntryTable::Inventory.movement(), Movement::Intake);
        assert_eq!(EntryTable::Dispatch.movement(), Movement::Dispatch);
        assert_eq!(EntryTable::Inventory.batch_column(), "ingreso_id");
        assert_eq!(EntryTable::Dispatch.table(), "dispatch_entries");
    }

    #[test]
    fn test_describe() {
        let product = Product {
            id: 1,
            name: "Clavo".to_string(),
            brand: "Inchalam".to_string(),
            stock: 0,
        };
        assert_eq!(describe(&product), "Clavo - Inchalam");
    }
}
