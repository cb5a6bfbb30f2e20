//! PDO connection object
//!
//! Reference: $PHP_SRC_PATH/ext/pdo/pdo_dbh.c

use crate::attributes::{
    ATTR_CLIENT_VERSION, ATTR_CONNECTION_STATUS, ATTR_SERVER_INFO, ATTR_SERVER_VERSION,
    COMPUTED_ATTRIBUTES,
};
use crate::drivers::DriverRegistry;
use crate::dsn;
use crate::error::{ErrorInfo, PdoError, PdoResult};
use crate::params;
use crate::session::{Finish, Session, SessionState, SharedSession, TransactionState};
use crate::statement::PdoStatement;
use crate::transaction::Transaction;
use crate::types::{ParamType, PdoValue};
use std::cell::RefCell;
use std::rc::Rc;

/// A database connection.
///
/// Statements and transaction handles created from a connection refer back to
/// it weakly; they stop working once the connection is dropped or
/// [`Pdo::disconnect`]ed.
#[derive(Debug)]
pub struct Pdo {
    session: SharedSession,
}

/// Soft failures while connecting still abort construction.
fn connect_error(err: PdoError) -> PdoError {
    match err {
        PdoError::Driver { .. } => {
            let info = ErrorInfo::from_error(&err);
            PdoError::ConnectionFailed {
                sqlstate: info.sqlstate,
                message: info.message.unwrap_or_default(),
            }
        }
        other => other,
    }
}

impl Pdo {
    /// Connect using the process-wide driver registry.
    ///
    /// `options` are applied in order through [`Pdo::set_attribute`]; a
    /// rejected option fails construction.
    pub fn new(
        dsn: &str,
        username: Option<&str>,
        password: Option<&str>,
        options: &[(i64, PdoValue)],
    ) -> PdoResult<Self> {
        let registry = DriverRegistry::snapshot();
        Self::connect_with(&registry, dsn, username, password, options)
    }

    pub fn connect_with(
        registry: &DriverRegistry,
        dsn: &str,
        username: Option<&str>,
        password: Option<&str>,
        options: &[(i64, PdoValue)],
    ) -> PdoResult<Self> {
        let info = dsn::parse(dsn)?;
        let driver = registry.lookup(&info.driver)?;
        let mut handle = driver.open(&info).map_err(connect_error)?;
        handle.login(username, password).map_err(connect_error)?;

        let mut state = SessionState::new(driver.name());
        for (id, value) in options {
            if !state.attributes.set(*id, value.clone()) {
                return Err(PdoError::InvalidAttribute {
                    id: *id,
                    value: value.to_string(),
                });
            }
        }

        tracing::debug!(driver = driver.name(), "connected");
        Ok(Self {
            session: Rc::new(RefCell::new(Session::new(handle, state))),
        })
    }

    /// Identifiers of the drivers in the process-wide registry.
    pub fn available_drivers() -> Vec<&'static str> {
        DriverRegistry::snapshot().available()
    }

    pub fn driver_name(&self) -> String {
        self.session.borrow().state.driver.clone()
    }

    /// Prepare `query`, rewriting named placeholders to positional ones.
    /// Returns `None` when the backend rejects the statement.
    pub fn prepare(&mut self, query: &str) -> PdoResult<Option<PdoStatement>> {
        let translated = params::translate(query);
        let mut session = self.session.borrow_mut();
        let result = session.handle()?.prepare(&translated.sql);
        let prepared = session.record(result)?;
        Ok(prepared.map(|info| {
            PdoStatement::prepared(Rc::downgrade(&self.session), query, translated, info)
        }))
    }

    /// Run `sql` and buffer its result set. Inside a transaction the query is
    /// routed through it.
    pub fn query(&mut self, sql: &str) -> PdoResult<Option<PdoStatement>> {
        let mut session = self.session.borrow_mut();
        let route = session.current_route();
        let rows = session.query(route, sql)?;
        Ok(rows.map(|rows| PdoStatement::from_rows(Rc::downgrade(&self.session), sql, rows)))
    }

    /// Execute `sql` and return the number of affected rows.
    pub fn exec(&mut self, sql: &str) -> PdoResult<Option<u64>> {
        let mut session = self.session.borrow_mut();
        let route = session.current_route();
        session.exec(route, sql)
    }

    /// Open a transaction and return a handle bound to it. `None` when a
    /// transaction is already open or the backend refused.
    pub fn begin(&mut self) -> PdoResult<Option<Transaction>> {
        let serial = self.session.borrow_mut().begin()?;
        Ok(serial.map(|serial| Transaction::new(Rc::downgrade(&self.session), serial)))
    }

    pub fn begin_transaction(&mut self) -> PdoResult<bool> {
        self.begin().map(|txn| txn.is_some())
    }

    pub fn commit(&mut self) -> PdoResult<bool> {
        let mut session = self.session.borrow_mut();
        session.finish(None, Finish::Commit)
    }

    pub fn rollback(&mut self) -> PdoResult<bool> {
        let mut session = self.session.borrow_mut();
        session.finish(None, Finish::Rollback)
    }

    pub fn in_transaction(&self) -> bool {
        self.session.borrow().state.in_transaction()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.session.borrow().state.transaction
    }

    /// Stored value first, then the driver's computed value. Computed ids the
    /// driver cannot answer fall back to the driver name.
    pub fn get_attribute(&self, id: i64) -> Option<PdoValue> {
        let mut session = self.session.borrow_mut();
        if let Some(value) = session.state.attributes.get(id) {
            return Some(value.clone());
        }
        if !COMPUTED_ATTRIBUTES.contains(&id) {
            return None;
        }
        let driver = session.state.driver.clone();
        let computed = match (id, session.handle.as_mut()) {
            (ATTR_SERVER_VERSION, Some(handle)) => handle.server_version(),
            (ATTR_CLIENT_VERSION, Some(handle)) => handle.client_version(),
            (ATTR_SERVER_INFO, Some(handle)) => handle.server_info(),
            (ATTR_CONNECTION_STATUS, Some(handle)) => handle.connection_status(),
            _ => None,
        };
        Some(PdoValue::Str(computed.unwrap_or(driver)))
    }

    /// Store an attribute. `false` when the value is rejected; the previous
    /// value is kept.
    pub fn set_attribute(&mut self, id: i64, value: impl Into<PdoValue>) -> bool {
        let value = value.into();
        let accepted = self.session.borrow_mut().state.attributes.set(id, value.clone());
        if !accepted {
            tracing::debug!(id, %value, "attribute value rejected");
        }
        accepted
    }

    pub fn error_code(&self) -> Option<String> {
        Some(self.session.borrow().state.error.sqlstate.clone())
    }

    pub fn error_info(&self) -> (String, Option<i64>, Option<String>) {
        self.session.borrow().state.error.as_tuple()
    }

    pub fn last_insert_id(&mut self, name: Option<&str>) -> PdoResult<Option<String>> {
        let mut session = self.session.borrow_mut();
        let result = session.handle()?.last_insert_id(name);
        session.absorb(result)
    }

    /// Quote `value` as a SQL literal for this driver.
    pub fn quote(&self, value: &str, param_type: ParamType) -> PdoResult<String> {
        let session = self.session.borrow();
        let handle = session.handle.as_ref().ok_or(PdoError::NotConnected)?;
        Ok(handle.quote(value, param_type))
    }

    /// Close the backend connection. Later calls fail with `NotConnected`;
    /// statements and transaction handles fail with `ConnectionReleased`.
    pub fn disconnect(&mut self) {
        let mut session = self.session.borrow_mut();
        if session.handle.take().is_some() {
            tracing::debug!(driver = %session.state.driver, "disconnected");
        }
        session.state.transaction = TransactionState::Idle;
    }

    pub fn is_connected(&self) -> bool {
        self.session.borrow().handle.is_some()
    }
}
