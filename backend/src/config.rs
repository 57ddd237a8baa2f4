//! Configuration management for the Warehouse Management Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with WMS_ prefix

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::DateRange;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Dispatch photo storage
    pub uploads: UploadConfig,

    /// Stock and display settings
    pub inventory: InventoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Apply pending migrations on startup
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,

    /// Refresh token expiration in seconds
    pub refresh_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Directory dispatch photos are written to and served from
    pub dir: String,

    /// Accepted photo extensions, lowercase
    pub allowed_extensions: Vec<String>,

    /// Maximum request body for a photo upload
    pub max_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    /// Products at or below this stock count as critical
    pub critical_stock_threshold: i32,

    /// Password given to users on an administrator reset
    pub default_reset_password: String,

    /// Offset from UTC used to display timestamps and interpret day filters
    pub display_utc_offset_minutes: i32,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("WMS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.run_migrations", environment == "development")?
            .set_default("jwt.access_token_expiry", 3600)?
            .set_default("jwt.refresh_token_expiry", 604800)?
            .set_default("uploads.dir", "uploads")?
            .set_default("uploads.allowed_extensions", vec!["png", "jpg", "jpeg", "gif"])?
            .set_default("uploads.max_bytes", 10 * 1024 * 1024)?
            .set_default("inventory.critical_stock_threshold", 5)?
            .set_default("inventory.default_reset_password", "changeme123")?
            .set_default("inventory.display_utc_offset_minutes", -180)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (WMS_ prefix)
            .add_source(
                Environment::with_prefix("WMS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("uploads.allowed_extensions")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Zone used to render timestamps and resolve calendar days
    pub fn display_zone(&self) -> DisplayZone {
        DisplayZone::from_minutes(self.inventory.display_utc_offset_minutes)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Fixed UTC offset used for everything a person reads or types as a date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayZone(FixedOffset);

impl DisplayZone {
    /// Out-of-range offsets fall back to UTC
    pub fn from_minutes(minutes: i32) -> Self {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or(Utc.fix());
        Self(offset)
    }

    /// Local calendar day of a stored timestamp
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.0).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    /// UTC instant at which a local day begins
    pub fn start_of_day(&self, day: NaiveDate) -> DateTime<Utc> {
        let midnight = day.and_time(chrono::NaiveTime::MIN);
        match self.0.from_local_datetime(&midnight).single() {
            Some(local) => local.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&midnight),
        }
    }

    /// `[start, end)` UTC bounds of an inclusive day range
    pub fn bounds(&self, range: &DateRange) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (
            range.start.map(|d| self.start_of_day(d)),
            range.end_exclusive().map(|d| self.start_of_day(d)),
        )
    }

    /// `dd/mm/yyyy HH:MM` in local time
    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.0).format("%d/%m/%Y %H:%M").to_string()
    }

    /// `dd/mm/yyyy HH:MM:SS` in local time
    pub fn format_seconds(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.0).format("%d/%m/%Y %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of_day_applies_offset() {
        let zone = DisplayZone::from_minutes(-180);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let start = zone.start_of_day(day);
        assert_eq!(start.to_rfc3339(), "2024-05-01T03:00:00+00:00");
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        let zone = DisplayZone::from_minutes(-180);
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 1, 30, 0).unwrap();
        assert_eq!(zone.local_date(at), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(zone.format(at), "01/05/2024 22:30");
    }

    #[test]
    fn test_bounds_end_is_inclusive() {
        let zone = DisplayZone::from_minutes(0);
        let range = DateRange::parse(Some("2024-05-01"), Some("2024-05-01"));
        let (start, end) = zone.bounds(&range);
        assert_eq!(end.unwrap() - start.unwrap(), chrono::Duration::days(1));
    }

    #[test]
    fn test_invalid_offset_falls_back_to_utc() {
        assert_eq!(DisplayZone::from_minutes(100_000), DisplayZone::from_minutes(0));
    }
}
