//! Purchase order (orden de compra) models

use serde::Deserialize;

use super::ItemInput;

/// Input for creating a purchase order
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateOrderInput {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub items: Vec<ItemInput>,
}

/// A line of an edited purchase order
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderLineInput {
    pub item_id: Option<i64>,
    #[serde(default, alias = "product")]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub quantity: i32,
}

/// Input for editing a purchase order
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditOrderInput {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub items: Vec<OrderLineInput>,
}
