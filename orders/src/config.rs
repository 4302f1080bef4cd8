//! Configuration management for the helpdesk.
//!
//! Loads configuration from environment variables with sensible defaults.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::env;

use crate::error::ConfigError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Collection holding the orders (default: `orders`)
    pub orders_collection: String,
    /// Offset used to display timestamps, `±HH:MM` (default: `-03:00`)
    pub display_utc_offset: String,
    /// Change notifications buffered per listener by the in-memory store (default: 64)
    pub snapshot_capacity: usize,
    /// Tracing filter directive (default: `info`)
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orders_collection: "orders".to_string(),
            display_utc_offset: "-03:00".to_string(),
            snapshot_capacity: 64,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `HELPDESK_ORDERS_COLLECTION`: collection name
    /// - `HELPDESK_DISPLAY_UTC_OFFSET`: display offset, e.g. `-03:00`
    /// - `HELPDESK_SNAPSHOT_CAPACITY`: listener buffer of the in-memory store
    /// - `RUST_LOG`: tracing filter
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            orders_collection: env::var("HELPDESK_ORDERS_COLLECTION")
                .unwrap_or(defaults.orders_collection),
            display_utc_offset: env::var("HELPDESK_DISPLAY_UTC_OFFSET")
                .unwrap_or(defaults.display_utc_offset),
            snapshot_capacity: env::var("HELPDESK_SNAPSHOT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.snapshot_capacity),
            log_filter: env::var("RUST_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// Parsed display offset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOffset`] if the value is not `±HH:MM`.
    pub fn display_offset(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.display_utc_offset)
    }

    /// Validate all values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orders_collection.trim().is_empty() {
            return Err(ConfigError::BlankCollection);
        }
        self.display_offset().map(|_| ())
    }
}

/// Parse `±HH:MM` into an offset east of UTC.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidOffset`] for anything else, including
/// offsets of a day or more.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::InvalidOffset(value.to_string());

    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hours) || !two_digits(minutes) {
        return Err(invalid());
    }
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn default_offset_is_brasilia() {
        let offset = Config::default().display_offset().unwrap();
        assert_eq!(offset.local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn parses_signed_offsets() {
        assert_eq!(parse_utc_offset("+05:30").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_utc_offset("-00:00").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn rejects_malformed_offsets() {
        for bad in [
            "", "03:00", "-3:00", "-03", "-03:60", "+24:00", "-0a:00", "−03:00", "-+3:00",
            "+03:-5", "+-1:+5",
        ] {
            assert_eq!(
                parse_utc_offset(bad),
                Err(ConfigError::InvalidOffset(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn blank_collection_is_invalid() {
        let config = Config {
            orders_collection: "  ".to_string(),
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::BlankCollection));
    }
}
