//! Audit log models

use serde::Deserialize;

/// Audit log filter. Text fields match case-insensitive substrings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub user: Option<String>,
    pub action: Option<String>,
    pub table: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}
