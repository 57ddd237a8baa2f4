//! Common types used across the platform

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// UI theme stored per user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl FromStr for Theme {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            _ => Err("Theme must be 'dark' or 'light'"),
        }
    }
}

/// Moment a dispatch photo was taken
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PhotoStage {
    /// Goods leaving the warehouse
    Salida,
    /// Goods handed to the client
    Entrega,
}

impl PhotoStage {
    /// Order in which stages appear in reports
    pub const ALL: [PhotoStage; 2] = [PhotoStage::Salida, PhotoStage::Entrega];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoStage::Salida => "salida",
            PhotoStage::Entrega => "entrega",
        }
    }
}

impl FromStr for PhotoStage {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "salida" => Ok(PhotoStage::Salida),
            "entrega" => Ok(PhotoStage::Entrega),
            _ => Err("Stage must be 'salida' or 'entrega'"),
        }
    }
}

/// Inclusive day range for history queries
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Build from raw query strings, ignoring values that do not parse
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.and_then(crate::text::parse_day),
            end: end.and_then(crate::text::parse_day),
        }
    }

    /// Exclusive upper bound: the day after `end`
    pub fn end_exclusive(&self) -> Option<NaiveDate> {
        self.end.and_then(|d| d.succ_opt())
    }
}

/// Reference counts that block deleting a product
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductUsage {
    pub inventory_entries: i64,
    pub dispatch_entries: i64,
    pub purchase_order_items: i64,
    pub total: i64,
}

impl ProductUsage {
    pub fn new(inventory_entries: i64, dispatch_entries: i64, purchase_order_items: i64) -> Self {
        Self {
            inventory_entries,
            dispatch_entries,
            purchase_order_items,
            total: inventory_entries + dispatch_entries + purchase_order_items,
        }
    }

    pub fn is_referenced(&self) -> bool {
        self.total > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_parse() {
        assert_eq!("light".parse::<Theme>(), Ok(Theme::Light));
        assert!("blue".parse::<Theme>().is_err());
        assert_eq!(Theme::default().as_str(), "dark");
    }

    #[test]
    fn test_photo_stage_parse() {
        assert_eq!("SALIDA".parse::<PhotoStage>(), Ok(PhotoStage::Salida));
        assert_eq!(" entrega ".parse::<PhotoStage>(), Ok(PhotoStage::Entrega));
        assert!("bodega".parse::<PhotoStage>().is_err());
    }

    #[test]
    fn test_date_range_end_is_inclusive() {
        let range = DateRange::parse(Some("01/05/2024"), Some("2024-05-31"));
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(range.end_exclusive(), NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(DateRange::parse(Some("x"), None), DateRange::default());
    }

    #[test]
    fn test_product_usage_total() {
        let usage = ProductUsage::new(2, 1, 0);
        assert_eq!(usage.total, 3);
        assert!(usage.is_referenced());
        assert!(!ProductUsage::default().is_referenced());
    }
}
