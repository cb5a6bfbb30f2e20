//! Transaction handle returned by [`crate::Pdo::begin`].
//!
//! The handle is bound to the transaction that created it. Once that
//! transaction is committed or rolled back (through the handle or through the
//! connection) further use fails with `TransactionFinished`. Dropping the
//! handle leaves the transaction open; finish it through the connection.
//! After the connection is dropped or disconnected every call fails with
//! `ConnectionReleased`.

use crate::error::{PdoError, PdoResult};
use crate::session::{Finish, Route, SharedSession, WeakSession};
use crate::statement::PdoStatement;

#[derive(Debug)]
pub struct Transaction {
    session: WeakSession,
    serial: u64,
}

impl Transaction {
    pub(crate) fn new(session: WeakSession, serial: u64) -> Self {
        Self { session, serial }
    }

    fn session(&self) -> PdoResult<SharedSession> {
        let session = self.session.upgrade().ok_or(PdoError::ConnectionReleased)?;
        if session.borrow().handle.is_none() {
            return Err(PdoError::ConnectionReleased);
        }
        Ok(session)
    }

    /// Whether this handle's transaction is still the open one.
    pub fn is_active(&self) -> bool {
        self.session().is_ok_and(|session| {
            let route = session.borrow().current_route();
            route == Route::Transaction(self.serial)
        })
    }

    pub fn query(&self, sql: &str) -> PdoResult<Option<PdoStatement>> {
        let session = self.session()?;
        let rows = session
            .borrow_mut()
            .query(Route::Transaction(self.serial), sql)?;
        Ok(rows.map(|rows| PdoStatement::from_rows(self.session.clone(), sql, rows)))
    }

    pub fn exec(&self, sql: &str) -> PdoResult<Option<u64>> {
        let session = self.session()?;
        let mut session = session.borrow_mut();
        session.exec(Route::Transaction(self.serial), sql)
    }

    pub fn commit(self) -> PdoResult<bool> {
        let session = self.session()?;
        let mut session = session.borrow_mut();
        session.finish(Some(self.serial), Finish::Commit)
    }

    pub fn rollback(self) -> PdoResult<bool> {
        let session = self.session()?;
        let mut session = session.borrow_mut();
        session.finish(Some(self.serial), Finish::Rollback)
    }
}
