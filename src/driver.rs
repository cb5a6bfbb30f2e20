//! PDO Driver Traits
//!
//! This module defines the interfaces that database drivers must implement
//! to be used by the PDO layer.
//!
//! Reference: $PHP_SRC_PATH/ext/pdo/php_pdo_driver.h

use crate::dsn::DsnInfo;
use crate::error::PdoResult;
use crate::types::{ParamType, PdoValue, RowSet};
use std::fmt::Debug;

/// Driver-assigned identifier of a backend prepared statement
pub type StatementId = u64;

/// What the backend learned while preparing a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedInfo {
    pub id: StatementId,
    pub param_count: usize,
    pub column_count: usize,
}

/// PDO driver trait - unified interface for all database drivers
/// Reference: pdo_driver_t structure
pub trait PdoDriver: Debug + Send + Sync {
    /// Driver name as it appears in the DSN prefix (e.g., "sqlite", "mysql")
    fn name(&self) -> &'static str;

    /// Open the transport for `dsn`. Authentication happens later in
    /// [`PdoConnection::login`].
    /// Reference: pdo_driver_t.db_handle_factory
    fn open(&self, dsn: &DsnInfo) -> PdoResult<Box<dyn PdoConnection>>;
}

/// PDO connection trait - one live backend session
/// Reference: pdo_dbh_t structure and pdo_dbh_methods
///
/// `Driver` errors returned from these methods are treated as soft failures by
/// the caller; any other variant aborts the calling operation.
pub trait PdoConnection: Debug + Send {
    /// Second connect phase. Drivers that authenticate while opening keep the
    /// default.
    fn login(&mut self, _username: Option<&str>, _password: Option<&str>) -> PdoResult<()> {
        Ok(())
    }

    /// Prepare a SQL statement containing positional `?` markers
    /// Reference: pdo_dbh_prepare_func
    fn prepare(&mut self, sql: &str) -> PdoResult<PreparedInfo>;

    /// Execute a statement returned by [`PdoConnection::prepare`]
    /// Reference: pdo_stmt_execute_func
    fn execute_prepared(&mut self, id: StatementId, params: &[PdoValue]) -> PdoResult<RowSet>;

    /// Release a prepared statement. Unknown ids are ignored.
    fn close_prepared(&mut self, id: StatementId);

    /// Run a query and buffer its result set
    fn query(&mut self, sql: &str) -> PdoResult<RowSet>;

    /// Execute a statement (no result set) and return affected rows
    /// Reference: pdo_dbh_do_func
    fn exec(&mut self, sql: &str) -> PdoResult<u64>;

    /// Quote a string for safe SQL inclusion
    /// Reference: pdo_dbh_quote_func
    fn quote(&self, value: &str, param_type: ParamType) -> String {
        match param_type {
            ParamType::Null => "NULL".to_string(),
            ParamType::Int => value
                .trim()
                .parse::<i64>()
                .map(|n| n.to_string())
                .unwrap_or_else(|_| "0".to_string()),
            _ => format!("'{}'", value.replace('\'', "''")),
        }
    }

    /// Reference: pdo_dbh_txn_func (beginTransaction)
    fn begin_transaction(&mut self) -> PdoResult<()>;

    /// Reference: pdo_dbh_txn_func (commit)
    fn commit(&mut self) -> PdoResult<()>;

    /// Reference: pdo_dbh_txn_func (rollback)
    fn rollback(&mut self) -> PdoResult<()>;

    /// Whether the backend session currently holds an open transaction
    fn in_transaction(&self) -> bool;

    /// Reference: pdo_dbh_last_id_func
    fn last_insert_id(&mut self, name: Option<&str>) -> PdoResult<String>;

    fn server_version(&mut self) -> Option<String> {
        None
    }

    fn client_version(&self) -> Option<String> {
        None
    }

    fn server_info(&mut self) -> Option<String> {
        None
    }

    fn connection_status(&mut self) -> Option<String> {
        None
    }
}
