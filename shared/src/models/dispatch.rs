//! Dispatch (despacho) models

use serde::Deserialize;

use super::{BatchLineInput, ItemInput};

/// Input for registering a dispatch batch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDispatchInput {
    #[serde(default)]
    pub client: String,
    pub order_number: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemInput>,
}

/// Input for editing a dispatch batch
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditDispatchInput {
    #[serde(default)]
    pub client: String,
    pub order_number: Option<String>,
    #[serde(default)]
    pub items: Vec<BatchLineInput>,
}

/// Dispatch history filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchHistoryQuery {
    /// Substring of the operator's username
    pub operator: Option<String>,
    /// Substring of the client's name
    pub client: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}
