//! PDOStatement
//!
//! A prepared statement, or the buffered result of a direct query. Statements
//! hold a weak reference to their connection's session; once the connection is
//! released every backend-facing call fails with `ConnectionReleased`.
//!
//! Reference: $PHP_SRC_PATH/ext/pdo/pdo_stmt.c

use crate::driver::{PreparedInfo, StatementId};
use crate::error::{
    ErrorInfo, PdoError, PdoResult, SQLSTATE_GENERAL, SQLSTATE_INVALID_PARAM,
};
use crate::params::{self, TranslatedQuery};
use crate::session::{SharedSession, WeakSession};
use crate::types::{ColumnMeta, FetchMode, FetchedRow, ParamIdentifier, ParamType, PdoValue, RowSet};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

#[derive(Debug)]
enum Source {
    Prepared {
        id: StatementId,
        param_count: usize,
        translated: TranslatedQuery,
    },
    /// Result of a direct query; nothing to execute.
    Query,
    Closed,
}

#[derive(Debug, Clone)]
enum Binding {
    Value(PdoValue, ParamType),
    /// Bound by reference: read when the statement executes.
    Param(Rc<RefCell<PdoValue>>, ParamType),
}

impl Binding {
    fn resolve(&self) -> PdoValue {
        match self {
            Binding::Value(value, ty) => value.clone().coerce(*ty),
            Binding::Param(cell, ty) => cell.borrow().clone().coerce(*ty),
        }
    }
}

#[derive(Debug, Default)]
struct Cursor {
    columns: Vec<String>,
    rows: VecDeque<Vec<PdoValue>>,
}

impl From<RowSet> for Cursor {
    fn from(rows: RowSet) -> Self {
        Self {
            columns: rows.columns,
            rows: rows.rows.into(),
        }
    }
}

#[derive(Debug)]
pub struct PdoStatement {
    session: WeakSession,
    query_string: String,
    source: Source,
    bindings: BTreeMap<usize, Binding>,
    cursor: Option<Cursor>,
    row_count: u64,
    column_count: usize,
    error: Option<ErrorInfo>,
}

impl PdoStatement {
    pub(crate) fn prepared(
        session: WeakSession,
        query: &str,
        translated: TranslatedQuery,
        info: PreparedInfo,
    ) -> Self {
        Self {
            session,
            query_string: query.to_string(),
            source: Source::Prepared {
                id: info.id,
                param_count: info.param_count,
                translated,
            },
            bindings: BTreeMap::new(),
            cursor: None,
            row_count: 0,
            column_count: info.column_count,
            error: None,
        }
    }

    pub(crate) fn from_rows(session: WeakSession, query: &str, rows: RowSet) -> Self {
        Self {
            session,
            query_string: query.to_string(),
            source: Source::Query,
            bindings: BTreeMap::new(),
            row_count: rows.affected_rows,
            column_count: rows.columns.len(),
            cursor: Some(Cursor::from(rows)),
            error: Some(ErrorInfo::success()),
        }
    }

    /// The SQL text as the caller wrote it, before placeholder rewriting.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Placeholder name -> position, when the query used named placeholders.
    pub fn param_map(&self) -> Option<&IndexMap<String, usize>> {
        match &self.source {
            Source::Prepared { translated, .. } if translated.has_named() => {
                Some(&translated.params)
            }
            _ => None,
        }
    }

    fn session(&self) -> PdoResult<SharedSession> {
        let session = self.session.upgrade().ok_or(PdoError::ConnectionReleased)?;
        if session.borrow().handle.is_none() {
            return Err(PdoError::ConnectionReleased);
        }
        Ok(session)
    }

    /// Record a soft failure on this statement and apply the connection's error mode.
    fn fail(&mut self, session: &SharedSession, info: ErrorInfo) -> PdoResult<()> {
        self.error = Some(info.clone());
        let mode = session.borrow().state.attributes.error_mode();
        mode.raise(&info)
    }

    /// Number of parameter slots: distinct names, or positional markers.
    fn slot_count(&self) -> usize {
        match &self.source {
            Source::Prepared {
                translated,
                param_count,
                ..
            } => {
                if translated.has_named() {
                    translated.params.len()
                } else {
                    *param_count
                }
            }
            _ => 0,
        }
    }

    fn position(&self, param: &ParamIdentifier) -> Option<usize> {
        match (&self.source, param) {
            (Source::Prepared { translated, .. }, ParamIdentifier::Named(name)) => {
                translated.params.get(params::normalize_name(name)).copied()
            }
            (Source::Prepared { .. }, ParamIdentifier::Positional(n)) => {
                (1..=self.slot_count()).contains(n).then_some(*n)
            }
            _ => None,
        }
    }

    fn bind(&mut self, param: ParamIdentifier, binding: Binding) -> PdoResult<bool> {
        let session = self.session()?;
        match self.position(&param) {
            Some(position) => {
                self.bindings.insert(position, binding);
                Ok(true)
            }
            None => {
                let info = ErrorInfo::new(
                    SQLSTATE_INVALID_PARAM,
                    None,
                    format!("parameter {param:?} is not defined"),
                );
                self.fail(&session, info).map(|()| false)
            }
        }
    }

    /// Bind a value, coerced to `param_type` at execute time.
    pub fn bind_value(
        &mut self,
        param: impl Into<ParamIdentifier>,
        value: impl Into<PdoValue>,
        param_type: ParamType,
    ) -> PdoResult<bool> {
        self.bind(param.into(), Binding::Value(value.into(), param_type))
    }

    /// Bind a variable; its current value is read each time the statement executes.
    pub fn bind_param(
        &mut self,
        param: impl Into<ParamIdentifier>,
        variable: Rc<RefCell<PdoValue>>,
        param_type: ParamType,
    ) -> PdoResult<bool> {
        self.bind(param.into(), Binding::Param(variable, param_type))
    }

    /// Execute with the bound parameters. Entries in `params` override
    /// bindings for the same slot.
    pub fn execute(
        &mut self,
        params: Option<&[(ParamIdentifier, PdoValue)]>,
    ) -> PdoResult<bool> {
        let session = self.session()?;
        let prepared = match &self.source {
            Source::Prepared { id, translated, .. } => Some((*id, translated.occurrences.clone())),
            Source::Query | Source::Closed => None,
        };
        let Some((id, occurrences)) = prepared else {
            let info = ErrorInfo::new(
                SQLSTATE_GENERAL,
                None,
                "statement has no prepared handle to execute",
            );
            return self.fail(&session, info).map(|()| false);
        };
        if matches!(&self.source, Source::Prepared { translated, .. } if translated.is_mixed()) {
            let info = ErrorInfo::new(
                SQLSTATE_INVALID_PARAM,
                None,
                "mixed named and positional parameters",
            );
            return self.fail(&session, info).map(|()| false);
        }

        let mut slots: Vec<Option<PdoValue>> = vec![None; self.slot_count()];
        for (position, binding) in &self.bindings {
            if let Some(slot) = slots.get_mut(position - 1) {
                *slot = Some(binding.resolve());
            }
        }
        for (param, value) in params.unwrap_or_default() {
            match self.position(param) {
                Some(position) => slots[position - 1] = Some(value.clone()),
                None => {
                    let info = ErrorInfo::new(
                        SQLSTATE_INVALID_PARAM,
                        None,
                        format!("parameter {param:?} is not defined"),
                    );
                    return self.fail(&session, info).map(|()| false);
                }
            }
        }
        let Some(values) = slots.into_iter().collect::<Option<Vec<_>>>() else {
            let info = ErrorInfo::new(
                SQLSTATE_INVALID_PARAM,
                None,
                "number of bound variables does not match number of tokens",
            );
            return self.fail(&session, info).map(|()| false);
        };
        let values = if occurrences.is_empty() {
            values
        } else {
            occurrences.iter().map(|p| values[p - 1].clone()).collect()
        };

        tracing::debug!(id, params = values.len(), "execute prepared statement");
        let result = session.borrow_mut().handle()?.execute_prepared(id, &values);
        match result {
            Ok(rows) => {
                self.row_count = rows.affected_rows;
                self.column_count = rows.columns.len();
                self.cursor = Some(Cursor::from(rows));
                self.error = Some(ErrorInfo::success());
                Ok(true)
            }
            Err(err) if err.is_soft() => {
                self.cursor = None;
                self.fail(&session, ErrorInfo::from_error(&err))
                    .map(|()| false)
            }
            Err(err) => Err(err),
        }
    }

    /// Execute with positional values; `values[0]` fills the first placeholder.
    pub fn execute_values(&mut self, values: &[PdoValue]) -> PdoResult<bool> {
        let params: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (ParamIdentifier::Positional(i + 1), v.clone()))
            .collect();
        self.execute(Some(&params))
    }

    fn resolve_mode(session: &SharedSession, mode: FetchMode) -> PdoResult<FetchMode> {
        if mode != FetchMode::Default {
            return Ok(mode);
        }
        let id = session.borrow().state.attributes.default_fetch_mode();
        FetchMode::from_i64(id)
            .filter(|m| *m != FetchMode::Default)
            .ok_or(PdoError::InvalidFetchMode(id))
    }

    /// Fetch the next row shaped by `mode`. `None` once the result is exhausted.
    pub fn fetch(&mut self, mode: FetchMode) -> PdoResult<Option<FetchedRow>> {
        let session = self.session()?;
        let mode = Self::resolve_mode(&session, mode)?;
        let case = session.borrow().state.attributes.case_folding();

        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match mode {
            FetchMode::Column if cursor.columns.is_empty() => {
                return Err(PdoError::InvalidColumnIndex(0));
            }
            FetchMode::KeyPair if cursor.columns.len() != 2 => {
                return Err(PdoError::InvalidFetchMode(FetchMode::KeyPair as i64));
            }
            _ => {}
        }
        let Some(mut values) = cursor.rows.pop_front() else {
            return Ok(None);
        };
        let names = cursor.columns.iter().map(|c| case.apply(c));

        let row = match mode {
            FetchMode::Num => FetchedRow::Num(values),
            FetchMode::Assoc => FetchedRow::Assoc(names.zip(values).collect()),
            FetchMode::Obj => FetchedRow::Obj(names.zip(values).collect()),
            FetchMode::Both => {
                let map = names.zip(values.iter().cloned()).collect();
                FetchedRow::Both(map, values)
            }
            FetchMode::Named => {
                let mut map: IndexMap<String, Vec<PdoValue>> = IndexMap::new();
                for (name, value) in names.zip(values) {
                    map.entry(name).or_default().push(value);
                }
                FetchedRow::Named(map)
            }
            FetchMode::Column => FetchedRow::Column(values.swap_remove(0)),
            FetchMode::KeyPair => {
                let value = values.pop().unwrap_or(PdoValue::Null);
                let key = values.pop().unwrap_or(PdoValue::Null);
                FetchedRow::KeyPair(key, value)
            }
            FetchMode::Default => return Err(PdoError::InvalidFetchMode(0)),
        };
        Ok(Some(row))
    }

    /// Fetch every remaining row.
    pub fn fetch_all(&mut self, mode: FetchMode) -> PdoResult<Vec<FetchedRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch(mode)? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Value of column `index` (0-based) from the next row.
    pub fn fetch_column(&mut self, index: usize) -> PdoResult<Option<PdoValue>> {
        self.session()?;
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        if index >= cursor.columns.len() {
            return Err(PdoError::InvalidColumnIndex(index));
        }
        Ok(cursor.rows.pop_front().map(|mut row| row.swap_remove(index)))
    }

    /// Rows affected by the last execute.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn column_meta(&self, index: usize) -> Option<ColumnMeta> {
        let name = self.cursor.as_ref()?.columns.get(index)?;
        Some(ColumnMeta {
            name: name.clone(),
            index,
        })
    }

    /// Discard the remaining rows so the statement can be executed again.
    pub fn close_cursor(&mut self) -> PdoResult<bool> {
        self.session()?;
        self.cursor = None;
        Ok(true)
    }

    /// SQLSTATE of the last operation on this statement, `None` before the first.
    pub fn error_code(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.sqlstate.clone())
    }

    pub fn error_info(&self) -> (String, Option<i64>, Option<String>) {
        self.error.clone().unwrap_or_default().as_tuple()
    }

    /// Release the backend prepared statement now rather than on drop.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Source::Prepared { id, .. } = self.source else {
            return;
        };
        self.source = Source::Closed;
        self.cursor = None;
        let Some(session) = self.session.upgrade() else {
            return;
        };
        // The session may already be borrowed if the statement is dropped
        // while a connection call is on the stack.
        if let Ok(mut session) = session.try_borrow_mut() {
            if let Some(handle) = session.handle.as_mut() {
                tracing::debug!(id, "closing prepared statement");
                handle.close_prepared(id);
            }
        }
    }
}

impl Drop for PdoStatement {
    fn drop(&mut self) {
        self.release();
    }
}
