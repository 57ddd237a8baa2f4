//! WebAssembly module for the Warehouse Management Platform
//!
//! Lets the browser forms check batch lines, preview a dispatch against the
//! stock it already has on screen and show order status without a round
//! trip to the server.

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use shared::stock::{plan_dispatch, DispatchLine, StockError, StockLedger};
use shared::text;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Field value as the server will store it
#[wasm_bindgen]
pub fn clean_text(value: &str) -> String {
    text::clean_text(value)
}

/// Error message for a batch line, or `None` when it is acceptable.
/// `editing` allows zero quantities (a line kept at zero on an edit form).
#[wasm_bindgen]
pub fn check_batch_line(name: &str, brand: &str, quantity: i32, editing: bool) -> Option<String> {
    let name = text::clean_text(name);
    let brand = text::clean_text(brand);
    let quantity_check = if editing {
        validate_edit_quantity(quantity)
    } else {
        validate_positive_quantity(quantity)
    };
    validate_product_label(&name, &brand)
        .and(quantity_check)
        .err()
        .map(str::to_string)
}

/// Whether an upload with this file name would be accepted.
/// `allowed` is a comma separated extension list.
#[wasm_bindgen]
pub fn is_allowed_photo(file_name: &str, allowed: &str) -> bool {
    let allowed: Vec<String> = allowed
        .split(',')
        .map(|ext| ext.trim().to_string())
        .filter(|ext| !ext.is_empty())
        .collect();
    allowed_extension(file_name, &allowed).is_some()
}

/// Status key (`pending`, `partial`, `completed`) of an order
#[wasm_bindgen]
pub fn order_status(requested: f64, dispatched: f64) -> String {
    shared::OrderStatus::from_totals(requested as i64, dispatched as i64)
        .as_str()
        .to_string()
}

/// Status label shown to warehouse staff
#[wasm_bindgen]
pub fn order_status_label(requested: f64, dispatched: f64) -> String {
    shared::OrderStatus::from_totals(requested as i64, dispatched as i64)
        .label()
        .to_string()
}

#[derive(Debug, Deserialize)]
struct PreviewStock {
    product_id: i64,
    stock: i32,
}

#[derive(Debug, Deserialize)]
struct PreviewLine {
    product_id: i64,
    quantity: i32,
}

#[derive(Debug, Serialize)]
struct PreviewResult {
    lines: Vec<DispatchLine>,
    shortfalls: usize,
}

fn dispatch_preview(stock: &[PreviewStock], lines: &[PreviewLine]) -> Result<Vec<DispatchLine>, StockError> {
    let mut ledger: StockLedger = stock.iter().map(|s| (s.product_id, s.stock)).collect();
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| plan_dispatch(&mut ledger, idx + 1, line.product_id, line.quantity))
        .collect()
}

/// Clamp a dispatch form against known stock.
///
/// `stock_json`: `[{product_id, stock}]`, `lines_json`: `[{product_id, quantity}]`.
/// Returns `{lines: [{product_id, requested, dispatched, available}], shortfalls}`.
#[wasm_bindgen]
pub fn preview_dispatch(stock_json: &str, lines_json: &str) -> Result<String, JsValue> {
    let stock: Vec<PreviewStock> = serde_json::from_str(stock_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid stock JSON: {}", e)))?;
    let lines: Vec<PreviewLine> = serde_json::from_str(lines_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid lines JSON: {}", e)))?;

    let lines = dispatch_preview(&stock, &lines).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let result = PreviewResult {
        shortfalls: lines.iter().filter(|l| l.shortfall().is_some()).count(),
        lines,
    };
    serde_json::to_string(&result).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_batch_line() {
        assert_eq!(check_batch_line("Tornillo", "Acme", 3, false), None);
        assert!(check_batch_line("Tornillo", "Acme", 0, false).is_some());
        assert_eq!(check_batch_line("Tornillo", "Acme", 0, true), None);
        assert!(check_batch_line("<b></b>", "Acme", 1, false).is_some());
    }

    #[test]
    fn test_is_allowed_photo() {
        assert!(is_allowed_photo("entrega.JPG", "png, jpg,jpeg"));
        assert!(!is_allowed_photo("entrega.pdf", "png,jpg"));
    }

    #[test]
    fn test_order_status() {
        assert_eq!(order_status(0.0, 0.0), "pending");
        assert_eq!(order_status(10.0, 3.0), "partial");
        assert_eq!(order_status_label(10.0, 10.0), "Completada");
    }

    #[test]
    fn test_dispatch_preview_shares_stock_between_lines() {
        let stock = vec![PreviewStock { product_id: 1, stock: 5 }];
        let lines = vec![
            PreviewLine { product_id: 1, quantity: 3 },
            PreviewLine { product_id: 1, quantity: 3 },
        ];
        let planned = dispatch_preview(&stock, &lines).unwrap();
        assert_eq!(planned[0].dispatched, 3);
        assert_eq!(planned[1].dispatched, 2);
        assert_eq!(planned[1].shortfall(), Some(1));
    }

    #[test]
    fn test_dispatch_preview_unknown_product() {
        let lines = vec![PreviewLine { product_id: 9, quantity: 1 }];
        assert!(dispatch_preview(&[], &lines).is_err());
    }
}
