//! Data source name parsing
//!
//! `driver:remainder`: the driver identifier runs up to the first colon and the
//! remainder belongs to the driver.
//!
//! Reference: $PHP_SRC_PATH/ext/pdo/pdo_dbh.c - PDO::__construct

use crate::error::{PdoError, PdoResult};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsnInfo {
    pub driver: String,
    pub remainder: String,
}

impl DsnInfo {
    /// Split the remainder as `key=value;key=value`. Keys are trimmed and
    /// kept as written; later duplicates win.
    pub fn options(&self) -> IndexMap<String, String> {
        parse_options(&self.remainder)
    }
}

/// Parse a DSN into its driver identifier and driver-specific remainder.
pub fn parse(dsn: &str) -> PdoResult<DsnInfo> {
    let (driver, remainder) = dsn
        .split_once(':')
        .ok_or_else(|| PdoError::InvalidDsn(format!("'{dsn}' has no driver prefix")))?;

    if driver.is_empty()
        || !driver
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(PdoError::InvalidDsn(format!(
            "'{driver}' is not a driver identifier"
        )));
    }

    Ok(DsnInfo {
        driver: driver.to_string(),
        remainder: remainder.to_string(),
    })
}

pub fn parse_options(remainder: &str) -> IndexMap<String, String> {
    let mut options = IndexMap::new();
    for part in remainder.split(';') {
        if let Some((k, v)) = part.split_once('=') {
            let key = k.trim();
            if !key.is_empty() {
                options.insert(key.to_string(), v.trim().to_string());
            }
        }
    }
    options
}
