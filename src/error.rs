//! Error taxonomy, the per-handle error snapshot and the SQLSTATE classifier
//!
//! Reference: $PHP_SRC_PATH/ext/pdo/pdo.c - pdo_raise_impl_error
//! Reference: $PHP_SRC_PATH/ext/pdo/pdo_sqlstate.c

use std::fmt;
use thiserror::Error;

/// SQLSTATE reported when the last operation succeeded.
pub const SQLSTATE_SUCCESS: &str = "00000";
/// Generic driver error.
pub const SQLSTATE_GENERAL: &str = "HY000";
/// Invalid parameter number (unbound or undefined placeholder).
pub const SQLSTATE_INVALID_PARAM: &str = "HY093";
pub const SQLSTATE_TABLE_NOT_FOUND: &str = "42S02";
pub const SQLSTATE_SYNTAX: &str = "42000";
pub const SQLSTATE_AUTHORIZATION: &str = "28000";
pub const SQLSTATE_INTEGRITY: &str = "23000";

/// Errors raised by PDO and its drivers.
///
/// Only [`PdoError::Driver`] is soft: connections and statements absorb it into
/// their error state. Everything else propagates to the caller unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PdoError {
    #[error("invalid data source name: {0}")]
    InvalidDsn(String),

    #[error("could not find driver '{0}'")]
    DriverNotFound(String),

    #[error("SQLSTATE[{sqlstate}] connection failed: {message}")]
    ConnectionFailed { sqlstate: String, message: String },

    #[error("no backend handle: the connection is not open")]
    NotConnected,

    #[error("connection claims an active transaction but the backend holds none")]
    TransactionHandleMissing,

    #[error("the owning connection has been released")]
    ConnectionReleased,

    #[error("transaction already finished")]
    TransactionFinished,

    #[error("attribute {id} rejected value {value}")]
    InvalidAttribute { id: i64, value: String },

    #[error("fetch mode {0} is not supported")]
    InvalidFetchMode(i64),

    #[error("invalid column index {0}")]
    InvalidColumnIndex(usize),

    /// Backend failure for a data-dependent reason. `sqlstate` is set when the
    /// backend reports one natively.
    #[error("driver error: {message}")]
    Driver {
        sqlstate: Option<String>,
        code: Option<i64>,
        message: String,
    },

    /// A soft failure re-raised because the error mode is EXCEPTION.
    #[error("{0}")]
    Sql(ErrorInfo),
}

impl PdoError {
    pub fn driver(message: impl Into<String>) -> Self {
        PdoError::Driver {
            sqlstate: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn driver_with_state(
        sqlstate: impl Into<String>,
        code: Option<i64>,
        message: impl Into<String>,
    ) -> Self {
        PdoError::Driver {
            sqlstate: Some(sqlstate.into()),
            code,
            message: message.into(),
        }
    }

    /// Whether the error is data-dependent and should be absorbed into error state.
    pub fn is_soft(&self) -> bool {
        matches!(self, PdoError::Driver { .. })
    }
}

pub type PdoResult<T> = Result<T, PdoError>;

/// Snapshot of the last error: `(sqlstate, driver code, message)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub sqlstate: String,
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl Default for ErrorInfo {
    fn default() -> Self {
        Self::success()
    }
}

impl ErrorInfo {
    pub fn success() -> Self {
        Self {
            sqlstate: SQLSTATE_SUCCESS.to_string(),
            code: None,
            message: None,
        }
    }

    pub fn new(sqlstate: &str, code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.to_string(),
            code,
            message: Some(message.into()),
        }
    }

    /// Build the snapshot for a soft error, preferring the backend's own
    /// SQLSTATE and falling back to the message classifier.
    pub fn from_error(err: &PdoError) -> Self {
        match err {
            PdoError::Driver {
                sqlstate,
                code,
                message,
            } => Self {
                sqlstate: sqlstate
                    .clone()
                    .unwrap_or_else(|| classify(message).to_string()),
                code: *code,
                message: Some(message.clone()),
            },
            PdoError::Sql(info) => info.clone(),
            other => Self::new(SQLSTATE_GENERAL, None, other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.sqlstate == SQLSTATE_SUCCESS
    }

    pub fn as_tuple(&self) -> (String, Option<i64>, Option<String>) {
        (self.sqlstate.clone(), self.code, self.message.clone())
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SQLSTATE[{}]", self.sqlstate)?;
        if let Some(code) = self.code {
            write!(f, " [{code}]")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Map a backend error message to a SQLSTATE with ordered substring heuristics.
///
/// First match wins. Messages matching nothing map to `HY000`.
pub fn classify(message: &str) -> &'static str {
    const RULES: &[(&[&str], &str)] = &[
        (
            &[
                "no such table",
                "no such view",
                "doesn't exist",
                "does not exist",
                "not found",
                "unknown table",
            ],
            SQLSTATE_TABLE_NOT_FOUND,
        ),
        (&["syntax error", "incomplete input"], SQLSTATE_SYNTAX),
        (
            &[
                "access denied",
                "authentication failed",
                "permission denied",
                "not authorized",
            ],
            SQLSTATE_AUTHORIZATION,
        ),
        (
            &[
                "unique constraint",
                "duplicate entry",
                "duplicate key",
                "not unique",
                "constraint failed",
            ],
            SQLSTATE_INTEGRITY,
        ),
    ];

    let lower = message.to_ascii_lowercase();
    RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lower.contains(needle)))
        .map_or(SQLSTATE_GENERAL, |(_, state)| *state)
}
