//! Connection attribute ids and the validated attribute table
//!
//! Reference: $PHP_SRC_PATH/ext/pdo/php_pdo_driver.h - enum pdo_attribute_type
//! Reference: $PHP_SRC_PATH/ext/pdo/pdo_dbh.c - pdo_dbh_attribute_set

use crate::error::{ErrorInfo, PdoError, PdoResult};
use crate::types::{FetchMode, PdoValue};
use std::collections::HashMap;

pub const ATTR_AUTOCOMMIT: i64 = 0;
pub const ATTR_PREFETCH: i64 = 1;
pub const ATTR_TIMEOUT: i64 = 2;
pub const ATTR_ERRMODE: i64 = 3;
pub const ATTR_SERVER_VERSION: i64 = 4;
pub const ATTR_CLIENT_VERSION: i64 = 5;
pub const ATTR_SERVER_INFO: i64 = 6;
pub const ATTR_CONNECTION_STATUS: i64 = 7;
pub const ATTR_CASE: i64 = 8;
pub const ATTR_PERSISTENT: i64 = 12;
pub const ATTR_DRIVER_NAME: i64 = 16;
pub const ATTR_STRINGIFY_FETCHES: i64 = 17;
pub const ATTR_DEFAULT_FETCH_MODE: i64 = 19;
pub const ATTR_EMULATE_PREPARES: i64 = 20;

pub const ERRMODE_SILENT: i64 = 0;
pub const ERRMODE_WARNING: i64 = 1;
pub const ERRMODE_EXCEPTION: i64 = 2;

pub const CASE_NATURAL: i64 = 0;
pub const CASE_UPPER: i64 = 1;
pub const CASE_LOWER: i64 = 2;

/// Ids whose value is synthesized from the live connection, never stored by default.
pub const COMPUTED_ATTRIBUTES: &[i64] = &[
    ATTR_SERVER_VERSION,
    ATTR_CLIENT_VERSION,
    ATTR_SERVER_INFO,
    ATTR_CONNECTION_STATUS,
    ATTR_DRIVER_NAME,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    Silent,
    Warning,
    Exception,
}

impl ErrorMode {
    /// Report a soft failure that has already been recorded in error state.
    pub(crate) fn raise(self, info: &ErrorInfo) -> PdoResult<()> {
        match self {
            ErrorMode::Silent => {
                tracing::debug!(sqlstate = %info.sqlstate, "soft failure recorded");
                Ok(())
            }
            ErrorMode::Warning => {
                tracing::warn!("{info}");
                Ok(())
            }
            ErrorMode::Exception => Err(PdoError::Sql(info.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFolding {
    Natural,
    Upper,
    Lower,
}

impl CaseFolding {
    pub fn apply(self, name: &str) -> String {
        match self {
            CaseFolding::Natural => name.to_string(),
            CaseFolding::Upper => name.to_uppercase(),
            CaseFolding::Lower => name.to_lowercase(),
        }
    }
}

/// Sparse attribute table keyed by attribute id.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    values: HashMap<i64, PdoValue>,
}

impl Default for Attributes {
    fn default() -> Self {
        let mut values = HashMap::new();
        values.insert(ATTR_ERRMODE, PdoValue::Int(ERRMODE_SILENT));
        values.insert(ATTR_DEFAULT_FETCH_MODE, PdoValue::Int(FetchMode::Both as i64));
        values.insert(ATTR_CASE, PdoValue::Int(CASE_NATURAL));
        values.insert(ATTR_AUTOCOMMIT, PdoValue::Bool(true));
        Self { values }
    }
}

impl Attributes {
    pub fn get(&self, id: i64) -> Option<&PdoValue> {
        self.values.get(&id)
    }

    /// Store `value` under `id`.
    ///
    /// `ATTR_ERRMODE` accepts integers 0..=2 and `ATTR_DEFAULT_FETCH_MODE`
    /// integers 1..=12; anything else for those two ids is rejected and the
    /// table is left unchanged. Every other id is accepted as-is.
    pub fn set(&mut self, id: i64, value: PdoValue) -> bool {
        let range = match id {
            ATTR_ERRMODE => Some(ERRMODE_SILENT..=ERRMODE_EXCEPTION),
            ATTR_DEFAULT_FETCH_MODE => Some(1..=12),
            _ => None,
        };
        if let Some(range) = range {
            match value {
                PdoValue::Int(v) if range.contains(&v) => {}
                _ => return false,
            }
        }
        self.values.insert(id, value);
        true
    }

    pub fn error_mode(&self) -> ErrorMode {
        match self.get(ATTR_ERRMODE).and_then(PdoValue::as_int) {
            Some(ERRMODE_WARNING) => ErrorMode::Warning,
            Some(ERRMODE_EXCEPTION) => ErrorMode::Exception,
            _ => ErrorMode::Silent,
        }
    }

    /// Raw default fetch mode id; resolved to a [`FetchMode`] at fetch time.
    pub fn default_fetch_mode(&self) -> i64 {
        self.get(ATTR_DEFAULT_FETCH_MODE)
            .and_then(PdoValue::as_int)
            .unwrap_or(FetchMode::Both as i64)
    }

    pub fn case_folding(&self) -> CaseFolding {
        match self.get(ATTR_CASE).and_then(PdoValue::as_int) {
            Some(CASE_UPPER) => CaseFolding::Upper,
            Some(CASE_LOWER) => CaseFolding::Lower,
            _ => CaseFolding::Natural,
        }
    }
}
