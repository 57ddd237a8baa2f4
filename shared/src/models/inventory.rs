//! Product and intake (ingreso) models

use serde::{Deserialize, Serialize};

/// One product line of an intake, dispatch or order form
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub quantity: i32,
}

/// A line of an edited intake or dispatch batch.
/// `entry_id` identifies the persisted entry being rewritten.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchLineInput {
    pub entry_id: Option<i64>,
    #[serde(default, alias = "product")]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    pub quantity: Option<i32>,
}

impl BatchLineInput {
    /// Submitted quantity; a line without one is rejected, zero is allowed
    pub fn edit_quantity(&self) -> Result<i32, &'static str> {
        let quantity = self.quantity.ok_or("Quantity is required")?;
        crate::validation::validate_edit_quantity(quantity)?;
        Ok(quantity)
    }
}

/// Input for registering an intake batch.
///
/// Either `items` or a single top-level `name`/`brand`/`quantity`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateIngresoInput {
    #[serde(default)]
    pub items: Vec<ItemInput>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub quantity: Option<i32>,
}

impl CreateIngresoInput {
    pub fn into_items(self) -> Vec<ItemInput> {
        if !self.items.is_empty() {
            return self.items;
        }
        if self.name.is_none() && self.brand.is_none() && self.quantity.is_none() {
            return Vec::new();
        }
        vec![ItemInput {
            name: self.name.unwrap_or_default(),
            brand: self.brand.unwrap_or_default(),
            quantity: self.quantity.unwrap_or_default(),
        }]
    }
}

/// Input for editing an intake batch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditIngresoInput {
    #[serde(default)]
    pub items: Vec<BatchLineInput>,
}

/// Intake history filter (`dd/mm/yyyy` or `yyyy-mm-dd`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngresoHistoryQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Input for overwriting a product's label and stock
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProductInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    pub stock: Option<i32>,
}

/// Input for merging duplicate products into one
#[derive(Debug, Clone, Deserialize)]
pub struct MergeProductsInput {
    pub target_id: i64,
    #[serde(default)]
    pub sources: Vec<i64>,
    pub new_name: Option<String>,
    pub new_brand: Option<String>,
}

/// Reference rows of a product selected for deletion
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteReferencesInput {
    #[serde(default)]
    pub inventory_entry_ids: Vec<i64>,
    #[serde(default)]
    pub dispatch_entry_ids: Vec<i64>,
    #[serde(default)]
    pub purchase_order_item_ids: Vec<i64>,
}

impl DeleteReferencesInput {
    pub fn is_empty(&self) -> bool {
        self.inventory_entry_ids.is_empty()
            && self.dispatch_entry_ids.is_empty()
            && self.purchase_order_item_ids.is_empty()
    }
}

/// Product autocomplete query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuggestQuery {
    #[serde(default)]
    pub q: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingreso_items_take_precedence() {
        let input: CreateIngresoInput = serde_json::from_str(
            r#"{"items":[{"name":"Cemento","brand":"Polpaico","quantity":3}],"name":"x"}"#,
        )
        .unwrap();
        let items = input.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Cemento");
    }

    #[test]
    fn test_ingreso_single_item_form() {
        let input: CreateIngresoInput =
            serde_json::from_str(r#"{"name":"Clavo","brand":"Inchalam","quantity":50}"#).unwrap();
        assert_eq!(
            input.into_items(),
            vec![ItemInput {
                name: "Clavo".into(),
                brand: "Inchalam".into(),
                quantity: 50
            }]
        );
    }

    #[test]
    fn test_ingreso_empty_payload() {
        let input: CreateIngresoInput = serde_json::from_str("{}").unwrap();
        assert!(input.into_items().is_empty());
    }

    #[test]
    fn test_batch_line_accepts_product_alias() {
        let line: BatchLineInput =
            serde_json::from_str(r#"{"entry_id":4,"product":"Clavo","brand":"Inchalam","quantity":0}"#)
                .unwrap();
        assert_eq!(line.entry_id, Some(4));
        assert_eq!(line.name, "Clavo");
        assert_eq!(line.edit_quantity(), Ok(0));
    }

    #[test]
    fn test_batch_line_without_quantity_rejected() {
        let line: BatchLineInput =
            serde_json::from_str(r#"{"entry_id":100,"name":"Cemento","brand":"Polpaico"}"#).unwrap();
        assert_eq!(line.quantity, None);
        assert!(line.edit_quantity().is_err());

        let line: BatchLineInput =
            serde_json::from_str(r#"{"entry_id":100,"name":"Cemento","brand":"Polpaico","quantity":-2}"#)
                .unwrap();
        assert!(line.edit_quantity().is_err());
    }

    #[test]
    fn test_fractional_quantity_rejected() {
        assert!(serde_json::from_str::<ItemInput>(r#"{"name":"a","brand":"b","quantity":1.5}"#).is_err());
    }
}
