//! MySQL PDO Driver
//!
//! Reference: $PHP_SRC_PATH/ext/pdo_mysql/mysql_driver.c

use crate::driver::{PdoConnection, PdoDriver, PreparedInfo, StatementId};
use crate::dsn::DsnInfo;
use crate::error::{PdoError, PdoResult, SQLSTATE_GENERAL};
use crate::types::{ParamType, PdoValue, RowSet};
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Params, Statement, Value};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
pub struct MysqlDriver;

impl PdoDriver for MysqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn open(&self, dsn: &DsnInfo) -> PdoResult<Box<dyn PdoConnection>> {
        let config = MysqlConfig::from_dsn(dsn)?;
        Ok(Box::new(MysqlConnection {
            config,
            conn: None,
            prepared: HashMap::new(),
            next_id: 1,
            in_transaction: false,
        }))
    }
}

/// Connection settings taken from `mysql:host=...;port=...;dbname=...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub dbname: Option<String>,
    pub unix_socket: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl MysqlConfig {
    pub(crate) fn from_dsn(dsn: &DsnInfo) -> PdoResult<Self> {
        let mut config = MysqlConfig {
            host: "localhost".to_string(),
            port: 3306,
            dbname: None,
            unix_socket: None,
            user: None,
            password: None,
        };
        for (key, value) in dsn.options() {
            match key.as_str() {
                "host" => config.host = value,
                "port" => {
                    config.port = value
                        .parse()
                        .map_err(|_| PdoError::InvalidDsn(format!("invalid port '{value}'")))?
                }
                "dbname" => config.dbname = Some(value),
                "unix_socket" => config.unix_socket = Some(value),
                "user" => config.user = Some(value),
                "password" => config.password = Some(value),
                _ => {}
            }
        }
        Ok(config)
    }
}

struct MysqlConnection {
    config: MysqlConfig,
    conn: Option<Conn>,
    prepared: HashMap<StatementId, Statement>,
    next_id: StatementId,
    in_transaction: bool,
}

impl fmt::Debug for MysqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlConnection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("connected", &self.conn.is_some())
            .field("prepared", &self.prepared.len())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

fn mysql_error(e: mysql::Error) -> PdoError {
    match e {
        mysql::Error::MySqlError(err) => {
            PdoError::driver_with_state(err.state, Some(err.code as i64), err.message)
        }
        other => PdoError::driver(other.to_string()),
    }
}

fn to_mysql(value: &PdoValue) -> Value {
    match value {
        PdoValue::Null => Value::NULL,
        PdoValue::Bool(b) => Value::Int(*b as i64),
        PdoValue::Int(i) => Value::Int(*i),
        PdoValue::Float(f) => Value::Double(*f),
        PdoValue::Str(s) => Value::Bytes(s.clone().into_bytes()),
        PdoValue::Blob(b) => Value::Bytes(b.clone()),
    }
}

pub(crate) fn from_mysql(value: &Value) -> PdoValue {
    match value {
        Value::NULL => PdoValue::Null,
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => PdoValue::Str(s.to_string()),
            Err(_) => PdoValue::Blob(bytes.clone()),
        },
        Value::Int(i) => PdoValue::Int(*i),
        Value::UInt(u) => i64::try_from(*u).map_or_else(|_| PdoValue::Str(u.to_string()), PdoValue::Int),
        Value::Float(f) => PdoValue::Float(f64::from(*f)),
        Value::Double(d) => PdoValue::Float(*d),
        Value::Date(y, m, d, h, i, s, _) => {
            PdoValue::Str(format!("{y:04}-{m:02}-{d:02} {h:02}:{i:02}:{s:02}"))
        }
        Value::Time(neg, days, h, i, s, _) => {
            let hours = *days * 24 + u32::from(*h);
            let sign = if *neg { "-" } else { "" };
            PdoValue::Str(format!("{sign}{hours:02}:{i:02}:{s:02}"))
        }
    }
}

/// Reference: mysql_real_escape_string
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl MysqlConnection {
    fn conn(&mut self) -> PdoResult<&mut Conn> {
        self.conn.as_mut().ok_or(PdoError::NotConnected)
    }
}

impl PdoConnection for MysqlConnection {
    fn login(&mut self, username: Option<&str>, password: Option<&str>) -> PdoResult<()> {
        let user = username.map(str::to_string).or_else(|| self.config.user.clone());
        let pass = password.map(str::to_string).or_else(|| self.config.password.clone());

        let mut builder = OptsBuilder::new()
            .ip_or_hostname(Some(self.config.host.clone()))
            .tcp_port(self.config.port)
            .user(user)
            .pass(pass)
            .db_name(self.config.dbname.clone());
        if let Some(socket) = &self.config.unix_socket {
            builder = builder.socket(Some(socket.clone()));
        }

        let conn = Conn::new(builder).map_err(|e| match e {
            mysql::Error::MySqlError(err) => PdoError::ConnectionFailed {
                sqlstate: err.state,
                message: err.message,
            },
            other => PdoError::ConnectionFailed {
                sqlstate: SQLSTATE_GENERAL.to_string(),
                message: other.to_string(),
            },
        })?;
        tracing::debug!(host = %self.config.host, port = self.config.port, "mysql session authenticated");
        self.conn = Some(conn);
        Ok(())
    }

    fn prepare(&mut self, sql: &str) -> PdoResult<PreparedInfo> {
        let stmt = self.conn()?.prep(sql).map_err(mysql_error)?;
        let id = self.next_id;
        self.next_id += 1;
        let info = PreparedInfo {
            id,
            param_count: usize::from(stmt.num_params()),
            column_count: usize::from(stmt.num_columns()),
        };
        self.prepared.insert(id, stmt);
        Ok(info)
    }

    fn execute_prepared(&mut self, id: StatementId, params: &[PdoValue]) -> PdoResult<RowSet> {
        let stmt = self
            .prepared
            .get(&id)
            .cloned()
            .ok_or_else(|| PdoError::driver(format!("unknown prepared statement {id}")))?;
        let values: Vec<Value> = params.iter().map(to_mysql).collect();
        let params = if values.is_empty() {
            Params::Empty
        } else {
            Params::Positional(values)
        };

        let result = self.conn()?.exec_iter(&stmt, params).map_err(mysql_error)?;
        collect(result)
    }

    fn close_prepared(&mut self, id: StatementId) {
        if let (Some(stmt), Some(conn)) = (self.prepared.remove(&id), self.conn.as_mut()) {
            if let Err(e) = conn.close(stmt) {
                tracing::debug!(error = %e, "closing mysql statement failed");
            }
        }
    }

    fn query(&mut self, sql: &str) -> PdoResult<RowSet> {
        let result = self.conn()?.query_iter(sql).map_err(mysql_error)?;
        collect(result)
    }

    fn exec(&mut self, sql: &str) -> PdoResult<u64> {
        let conn = self.conn()?;
        conn.query_drop(sql).map_err(mysql_error)?;
        Ok(conn.affected_rows())
    }

    fn quote(&self, value: &str, param_type: ParamType) -> String {
        match param_type {
            ParamType::Null => "NULL".to_string(),
            _ => escape(value),
        }
    }

    fn begin_transaction(&mut self) -> PdoResult<()> {
        self.conn()?
            .query_drop("START TRANSACTION")
            .map_err(mysql_error)?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> PdoResult<()> {
        self.in_transaction = false;
        self.conn()?.query_drop("COMMIT").map_err(mysql_error)
    }

    fn rollback(&mut self) -> PdoResult<()> {
        self.in_transaction = false;
        self.conn()?.query_drop("ROLLBACK").map_err(mysql_error)
    }

    fn in_transaction(&self) -> bool {
        self.conn.is_some() && self.in_transaction
    }

    fn last_insert_id(&mut self, _name: Option<&str>) -> PdoResult<String> {
        Ok(self.conn()?.last_insert_id().to_string())
    }

    fn server_version(&mut self) -> Option<String> {
        let (major, minor, patch) = self.conn.as_ref()?.server_version();
        Some(format!("{major}.{minor}.{patch}"))
    }

    fn client_version(&self) -> Option<String> {
        Some("mysql-rust".to_string())
    }

    fn connection_status(&mut self) -> Option<String> {
        self.conn
            .as_ref()
            .map(|_| format!("{} via TCP/IP", self.config.host))
    }
}

fn collect<P: mysql::prelude::Protocol>(
    result: mysql::QueryResult<'_, '_, '_, P>,
) -> PdoResult<RowSet> {
    let columns: Vec<String> = result
        .columns()
        .as_ref()
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();
    let affected_rows = result.affected_rows();

    let mut rows = Vec::new();
    for row in result {
        let row = row.map_err(mysql_error)?;
        rows.push(
            (0..row.len())
                .map(|i| row.as_ref(i).map_or(PdoValue::Null, from_mysql))
                .collect(),
        );
    }

    let affected_rows = if columns.is_empty() {
        affected_rows
    } else {
        rows.len() as u64
    };
    Ok(RowSet {
        columns,
        rows,
        affected_rows,
    })
}
