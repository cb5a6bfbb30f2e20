//! SQLite PDO Driver
//!
//! Implements the PDO driver interface for SQLite databases using rusqlite.
//!
//! Reference: $PHP_SRC_PATH/ext/pdo_sqlite/sqlite_driver.c

use crate::driver::{PdoConnection, PdoDriver, PreparedInfo, StatementId};
use crate::dsn::DsnInfo;
use crate::error::{PdoError, PdoResult};
use crate::types::{PdoValue, RowSet};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, params_from_iter};
use std::collections::HashMap;

/// SQLite driver implementation
#[derive(Debug)]
pub struct SqliteDriver;

impl PdoDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn open(&self, dsn: &DsnInfo) -> PdoResult<Box<dyn PdoConnection>> {
        // DSN format: "sqlite:/path/to/db.sqlite" or "sqlite::memory:"
        let path = dsn.remainder.as_str();
        let conn = if path.is_empty() || path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| PdoError::ConnectionFailed {
            sqlstate: "HY000".to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(path, "sqlite database opened");
        Ok(Box::new(SqliteConnection {
            conn,
            prepared: HashMap::new(),
            next_id: 1,
        }))
    }
}

/// SQLite connection implementation
///
/// rusqlite statements borrow the connection, so prepared statements are kept
/// as SQL text and served from rusqlite's statement cache on execute.
#[derive(Debug)]
struct SqliteConnection {
    conn: Connection,
    prepared: HashMap<StatementId, String>,
    next_id: StatementId,
}

fn sqlite_error(e: rusqlite::Error) -> PdoError {
    let code = match &e {
        rusqlite::Error::SqliteFailure(err, _) => Some(err.extended_code as i64),
        _ => None,
    };
    PdoError::Driver {
        sqlstate: None,
        code,
        message: e.to_string(),
    }
}

fn to_sqlite(value: &PdoValue) -> Value {
    match value {
        PdoValue::Null => Value::Null,
        PdoValue::Bool(b) => Value::Integer(*b as i64),
        PdoValue::Int(i) => Value::Integer(*i),
        PdoValue::Float(f) => Value::Real(*f),
        PdoValue::Str(s) => Value::Text(s.clone()),
        PdoValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> PdoValue {
    match value {
        ValueRef::Null => PdoValue::Null,
        ValueRef::Integer(i) => PdoValue::Int(i),
        ValueRef::Real(f) => PdoValue::Float(f),
        ValueRef::Text(t) => PdoValue::Str(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => PdoValue::Blob(b.to_vec()),
    }
}

impl SqliteConnection {
    fn run(&self, sql: &str, params: &[PdoValue]) -> PdoResult<RowSet> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(sqlite_error)?;
        let values: Vec<Value> = params.iter().map(to_sqlite).collect();

        if stmt.column_count() == 0 {
            let affected = stmt
                .execute(params_from_iter(values.iter()))
                .map_err(sqlite_error)?;
            return Ok(RowSet::affected(affected as u64));
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = stmt
            .query(params_from_iter(values.iter()))
            .map_err(sqlite_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(sqlite_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(row.get_ref(i).map(from_sqlite).map_err(sqlite_error)?);
            }
            out.push(values);
        }

        Ok(RowSet {
            columns,
            rows: out,
            affected_rows: 0,
        })
    }
}

impl PdoConnection for SqliteConnection {
    fn prepare(&mut self, sql: &str) -> PdoResult<PreparedInfo> {
        // Validate SQL syntax by preparing it
        let (param_count, column_count) = {
            let stmt = self.conn.prepare_cached(sql).map_err(sqlite_error)?;
            (stmt.parameter_count(), stmt.column_count())
        };

        let id = self.next_id;
        self.next_id += 1;
        self.prepared.insert(id, sql.to_string());
        Ok(PreparedInfo {
            id,
            param_count,
            column_count,
        })
    }

    fn execute_prepared(&mut self, id: StatementId, params: &[PdoValue]) -> PdoResult<RowSet> {
        let sql = self
            .prepared
            .get(&id)
            .ok_or_else(|| PdoError::driver(format!("unknown prepared statement {id}")))?;
        self.run(sql, params)
    }

    fn close_prepared(&mut self, id: StatementId) {
        self.prepared.remove(&id);
    }

    fn query(&mut self, sql: &str) -> PdoResult<RowSet> {
        self.run(sql, &[])
    }

    fn exec(&mut self, sql: &str) -> PdoResult<u64> {
        let mut stmt = self.conn.prepare(sql).map_err(sqlite_error)?;
        if stmt.column_count() > 0 {
            let mut rows = stmt.query([]).map_err(sqlite_error)?;
            while rows.next().map_err(sqlite_error)?.is_some() {}
            return Ok(0);
        }
        stmt.execute([])
            .map(|n| n as u64)
            .map_err(sqlite_error)
    }

    fn begin_transaction(&mut self) -> PdoResult<()> {
        self.conn.execute_batch("BEGIN").map_err(sqlite_error)
    }

    fn commit(&mut self) -> PdoResult<()> {
        self.conn.execute_batch("COMMIT").map_err(sqlite_error)
    }

    fn rollback(&mut self) -> PdoResult<()> {
        self.conn.execute_batch("ROLLBACK").map_err(sqlite_error)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn last_insert_id(&mut self, _name: Option<&str>) -> PdoResult<String> {
        Ok(self.conn.last_insert_rowid().to_string())
    }

    fn server_version(&mut self) -> Option<String> {
        Some(rusqlite::version().to_string())
    }

    fn client_version(&self) -> Option<String> {
        Some(rusqlite::version().to_string())
    }
}
