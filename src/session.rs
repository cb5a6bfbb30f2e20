//! Per-connection session state shared by a connection, its statements and
//! its transaction handle.
//!
//! Reference: $PHP_SRC_PATH/ext/pdo/php_pdo_driver.h - struct _pdo_dbh_t

use crate::attributes::Attributes;
use crate::driver::PdoConnection;
use crate::error::{ErrorInfo, PdoError, PdoResult};
use crate::types::RowSet;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub(crate) type SharedSession = Rc<RefCell<Session>>;
pub(crate) type WeakSession = Weak<RefCell<Session>>;

/// Transaction state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    /// A transaction is open. `serial` identifies the handle that opened it.
    Active { serial: u64 },
}

/// Where a query or exec is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Connection,
    Transaction(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finish {
    Commit,
    Rollback,
}

/// Connection-level state: driver name, transaction state, attributes and the
/// last error.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub driver: String,
    pub transaction: TransactionState,
    pub attributes: Attributes,
    pub error: ErrorInfo,
    next_serial: u64,
}

impl SessionState {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            transaction: TransactionState::Idle,
            attributes: Attributes::default(),
            error: ErrorInfo::success(),
            next_serial: 1,
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self.transaction, TransactionState::Active { .. })
    }
}

#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) handle: Option<Box<dyn PdoConnection>>,
    pub(crate) state: SessionState,
}

impl Session {
    pub(crate) fn new(handle: Box<dyn PdoConnection>, state: SessionState) -> Self {
        Self {
            handle: Some(handle),
            state,
        }
    }

    pub(crate) fn handle(&mut self) -> PdoResult<&mut Box<dyn PdoConnection>> {
        self.handle.as_mut().ok_or(PdoError::NotConnected)
    }

    /// Route for calls made on the connection itself.
    pub(crate) fn current_route(&self) -> Route {
        match self.state.transaction {
            TransactionState::Idle => Route::Connection,
            TransactionState::Active { serial } => Route::Transaction(serial),
        }
    }

    /// Verify that `route` still points at a live target.
    ///
    /// A transaction route whose serial is no longer current fails with
    /// `TransactionFinished`. If the connection believes a transaction is open
    /// but the backend disagrees, the state is reset to idle and the call fails
    /// with `TransactionHandleMissing`.
    fn check_route(&mut self, route: Route) -> PdoResult<()> {
        let Route::Transaction(serial) = route else {
            return Ok(());
        };
        match self.state.transaction {
            TransactionState::Active { serial: current } if current == serial => {}
            _ => return Err(PdoError::TransactionFinished),
        }
        if !self.handle()?.in_transaction() {
            tracing::warn!(serial, "backend has no open transaction, resetting to idle");
            self.state.transaction = TransactionState::Idle;
            return Err(PdoError::TransactionHandleMissing);
        }
        Ok(())
    }

    /// Record the outcome of a backend call in the error state.
    ///
    /// Success clears the error state. A soft failure is recorded and then
    /// handed to the error mode, which may turn it into `PdoError::Sql`.
    /// Fatal errors pass through untouched.
    pub(crate) fn record<T>(&mut self, result: PdoResult<T>) -> PdoResult<Option<T>> {
        match result {
            Ok(value) => {
                self.state.error = ErrorInfo::success();
                Ok(Some(value))
            }
            Err(err) => self.fail(err).map(|()| None),
        }
    }

    /// Like [`Session::record`] but leaves the error state alone on success.
    pub(crate) fn absorb<T>(&mut self, result: PdoResult<T>) -> PdoResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => self.fail(err).map(|()| None),
        }
    }

    fn fail(&mut self, err: PdoError) -> PdoResult<()> {
        if !err.is_soft() {
            return Err(err);
        }
        let info = ErrorInfo::from_error(&err);
        self.state.error = info.clone();
        self.state.attributes.error_mode().raise(&info)
    }

    pub(crate) fn query(&mut self, route: Route, sql: &str) -> PdoResult<Option<RowSet>> {
        self.check_route(route)?;
        tracing::debug!(?route, sql, "query");
        let result = self.handle()?.query(sql);
        self.record(result)
    }

    pub(crate) fn exec(&mut self, route: Route, sql: &str) -> PdoResult<Option<u64>> {
        self.check_route(route)?;
        tracing::debug!(?route, sql, "exec");
        let result = self.handle()?.exec(sql);
        self.record(result)
    }

    /// Open a transaction and return its serial, or `None` when one is
    /// already open or the backend refused.
    pub(crate) fn begin(&mut self) -> PdoResult<Option<u64>> {
        if self.state.in_transaction() {
            tracing::debug!("begin ignored: transaction already active");
            return Ok(None);
        }
        let result = self.handle()?.begin_transaction();
        if self.absorb(result)?.is_none() {
            return Ok(None);
        }
        let serial = self.state.next_serial;
        self.state.next_serial += 1;
        self.state.transaction = TransactionState::Active { serial };
        tracing::debug!(serial, "transaction started");
        Ok(Some(serial))
    }

    /// Commit or roll back the open transaction.
    ///
    /// `expected` is the serial of the handle asking; `None` means the
    /// connection itself. The state returns to idle even when the backend
    /// call fails, in which case the outcome on the server is unknown.
    pub(crate) fn finish(&mut self, expected: Option<u64>, finish: Finish) -> PdoResult<bool> {
        let serial = match (self.state.transaction, expected) {
            (TransactionState::Active { serial }, None) => serial,
            (TransactionState::Active { serial }, Some(wanted)) if serial == wanted => serial,
            (_, Some(_)) => return Err(PdoError::TransactionFinished),
            (TransactionState::Idle, None) => {
                tracing::debug!(?finish, "no active transaction");
                return Ok(false);
            }
        };

        let handle = self.handle()?;
        let result = match finish {
            Finish::Commit => handle.commit(),
            Finish::Rollback => handle.rollback(),
        };
        self.state.transaction = TransactionState::Idle;

        match result {
            Ok(()) => {
                tracing::debug!(serial, ?finish, "transaction finished");
                Ok(true)
            }
            Err(err) => {
                if err.is_soft() {
                    tracing::warn!(serial, ?finish, error = %err, "transaction outcome unknown");
                }
                self.fail(err).map(|()| false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{ATTR_ERRMODE, ERRMODE_EXCEPTION};
    use crate::driver::PdoDriver;
    use crate::drivers::sqlite::SqliteDriver;
    use crate::types::PdoValue;

    fn session() -> Session {
        let dsn = crate::dsn::parse("sqlite::memory:").unwrap();
        let handle = SqliteDriver.open(&dsn).unwrap();
        Session::new(handle, SessionState::new("sqlite"))
    }

    #[test]
    fn test_record_clears_and_sets_error_state() {
        let mut s = session();
        assert_eq!(s.exec(Route::Connection, "SELEC 1").unwrap(), None);
        assert_eq!(s.state.error.sqlstate, "42000");
        assert_eq!(s.exec(Route::Connection, "CREATE TABLE t (a)").unwrap(), Some(0));
        assert!(s.state.error.is_success());
    }

    #[test]
    fn test_exception_mode_raises_after_recording() {
        let mut s = session();
        s.state
            .attributes
            .set(ATTR_ERRMODE, PdoValue::Int(ERRMODE_EXCEPTION));
        let err = s.query(Route::Connection, "SELECT * FROM missing").unwrap_err();
        assert!(matches!(err, PdoError::Sql(ref info) if info.sqlstate == "42S02"));
        assert_eq!(s.state.error.sqlstate, "42S02");
    }

    #[test]
    fn test_stale_serial_is_rejected() {
        let mut s = session();
        let first = s.begin().unwrap().unwrap();
        assert!(s.finish(Some(first), Finish::Commit).unwrap());
        let second = s.begin().unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(
            s.exec(Route::Transaction(first), "SELECT 1"),
            Err(PdoError::TransactionFinished)
        );
        assert_eq!(
            s.finish(Some(first), Finish::Rollback),
            Err(PdoError::TransactionFinished)
        );
        assert!(s.finish(Some(second), Finish::Rollback).unwrap());
    }

    #[test]
    fn test_backend_without_transaction_is_fatal() {
        let mut s = session();
        let serial = s.begin().unwrap().unwrap();
        // End the backend transaction behind the session's back.
        s.handle().unwrap().commit().unwrap();
        assert_eq!(
            s.exec(Route::Transaction(serial), "SELECT 1"),
            Err(PdoError::TransactionHandleMissing)
        );
        assert_eq!(s.state.transaction, TransactionState::Idle);
    }

    #[test]
    fn test_missing_handle() {
        let mut s = session();
        s.handle = None;
        assert_eq!(s.exec(Route::Connection, "SELECT 1"), Err(PdoError::NotConnected));
        assert_eq!(s.begin(), Err(PdoError::NotConnected));
    }
}
