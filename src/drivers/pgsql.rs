//! PostgreSQL PDO Driver
//!
//! Parameters travel in text format, the way libpq-based drivers send them,
//! so the server decides how to interpret each value. `?` markers are
//! renumbered to `$n` before preparing.
//!
//! Reference: $PHP_SRC_PATH/ext/pdo_pgsql/pgsql_driver.c

use crate::driver::{PdoConnection, PdoDriver, PreparedInfo, StatementId};
use crate::dsn::DsnInfo;
use crate::error::{PdoError, PdoResult, SQLSTATE_GENERAL};
use crate::params;
use crate::types::{PdoValue, RowSet};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::types::{Format, FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use postgres::{Client, Config, NoTls, Row, SimpleQueryMessage, Statement};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::net::IpAddr;

#[derive(Debug)]
pub struct PgsqlDriver;

impl PdoDriver for PgsqlDriver {
    fn name(&self) -> &'static str {
        "pgsql"
    }

    fn open(&self, dsn: &DsnInfo) -> PdoResult<Box<dyn PdoConnection>> {
        let config = PgsqlConfig::from_dsn(dsn)?;
        Ok(Box::new(PgsqlConnection {
            config,
            client: None,
            prepared: HashMap::new(),
            next_id: 1,
            in_transaction: false,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PgsqlConfig {
    pub host: String,
    pub port: u16,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl PgsqlConfig {
    pub(crate) fn from_dsn(dsn: &DsnInfo) -> PdoResult<Self> {
        let mut config = PgsqlConfig {
            host: "localhost".to_string(),
            port: 5432,
            dbname: None,
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
                "user" => config.user = Some(value),
                "password" => config.password = Some(value),
                _ => {}
            }
        }
        Ok(config)
    }
}

struct PgsqlConnection {
    config: PgsqlConfig,
    client: Option<Client>,
    prepared: HashMap<StatementId, Statement>,
    next_id: StatementId,
    in_transaction: bool,
}

impl fmt::Debug for PgsqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgsqlConnection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("connected", &self.client.is_some())
            .field("prepared", &self.prepared.len())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

fn pgsql_error(e: postgres::Error) -> PdoError {
    let message = e
        .as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| e.to_string());
    match e.code() {
        Some(state) => PdoError::driver_with_state(state.code(), None, message),
        None => PdoError::driver(message),
    }
}

/// A bound value sent to the server as text.
#[derive(Debug)]
struct TextParam<'a>(&'a PdoValue);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            PdoValue::Null => return Ok(IsNull::Yes),
            PdoValue::Bool(b) => out.extend_from_slice(if *b { b"t" } else { b"f" }),
            PdoValue::Blob(bytes) => {
                out.extend_from_slice(b"\\x");
                for b in bytes {
                    out.extend_from_slice(format!("{b:02x}").as_bytes());
                }
            }
            other => out.extend_from_slice(other.to_string().as_bytes()),
        }
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// Render a binary-format column value. Types without a decoder are an
/// error rather than NULL.
fn decode(ty: &Type, raw: &[u8]) -> Result<PdoValue, Box<dyn Error + Sync + Send>> {
    let value = match ty.name() {
        "bool" => PdoValue::Bool(bool::from_sql(ty, raw)?),
        "int2" => PdoValue::Int(i16::from_sql(ty, raw)?.into()),
        "int4" => PdoValue::Int(i32::from_sql(ty, raw)?.into()),
        "int8" => PdoValue::Int(i64::from_sql(ty, raw)?),
        "oid" => PdoValue::Int(u32::from_sql(ty, raw)?.into()),
        "float4" => PdoValue::Float(f32::from_sql(ty, raw)?.into()),
        "float8" => PdoValue::Float(f64::from_sql(ty, raw)?),
        "bytea" => PdoValue::Blob(<Vec<u8>>::from_sql(ty, raw)?),
        "numeric" => PdoValue::Str(Decimal::from_sql(ty, raw)?.to_string()),
        "date" => PdoValue::Str(NaiveDate::from_sql(ty, raw)?.to_string()),
        "time" => PdoValue::Str(NaiveTime::from_sql(ty, raw)?.to_string()),
        "timestamp" => PdoValue::Str(NaiveDateTime::from_sql(ty, raw)?.to_string()),
        "timestamptz" => PdoValue::Str(
            DateTime::<Utc>::from_sql(ty, raw)?
                .format("%Y-%m-%d %H:%M:%S%.f%:::z")
                .to_string(),
        ),
        "json" | "jsonb" => PdoValue::Str(serde_json::Value::from_sql(ty, raw)?.to_string()),
        "inet" => PdoValue::Str(IpAddr::from_sql(ty, raw)?.to_string()),
        "uuid" => PdoValue::Str(uuid_text(raw)?),
        _ if <&str as FromSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_)) => {
            PdoValue::Str(std::str::from_utf8(raw)?.to_string())
        }
        other => return Err(format!("unsupported column type {other}").into()),
    };
    Ok(value)
}

fn uuid_text(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() != 16 {
        return Err(format!("invalid uuid length {}", raw.len()).into());
    }
    let hex = |bytes: &[u8]| bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();
    Ok(format!(
        "{}-{}-{}-{}-{}",
        hex(&raw[0..4]),
        hex(&raw[4..6]),
        hex(&raw[6..8]),
        hex(&raw[8..10]),
        hex(&raw[10..16])
    ))
}

/// Any column, decoded through [`decode`]; SQL NULL becomes `PdoValue::Null`.
#[derive(Debug)]
struct ColumnValue(PdoValue);

impl<'a> FromSql<'a> for ColumnValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        decode(ty, raw).map(ColumnValue)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(ColumnValue(PdoValue::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn from_pgsql(row: &Row, index: usize) -> PdoResult<PdoValue> {
    row.try_get::<_, ColumnValue>(index)
        .map(|value| value.0)
        .map_err(|e| {
            let cause = e.source().map_or_else(|| e.to_string(), ToString::to_string);
            PdoError::driver(format!("column '{}': {cause}", row.columns()[index].name()))
        })
}

impl PgsqlConnection {
    fn client(&mut self) -> PdoResult<&mut Client> {
        self.client.as_mut().ok_or(PdoError::NotConnected)
    }

    fn simple(&mut self, sql: &str) -> PdoResult<Vec<SimpleQueryMessage>> {
        self.client()?.simple_query(sql).map_err(pgsql_error)
    }

    fn scalar(&mut self, sql: &str) -> PdoResult<Option<String>> {
        for message in self.simple(sql)? {
            if let SimpleQueryMessage::Row(row) = message {
                return Ok(row.get(0).map(str::to_string));
            }
        }
        Ok(None)
    }
}

impl PdoConnection for PgsqlConnection {
    fn login(&mut self, username: Option<&str>, password: Option<&str>) -> PdoResult<()> {
        let mut config = Config::new();
        config.host(&self.config.host).port(self.config.port);
        if let Some(dbname) = &self.config.dbname {
            config.dbname(dbname);
        }
        if let Some(user) = username.or(self.config.user.as_deref()) {
            config.user(user);
        }
        if let Some(password) = password.or(self.config.password.as_deref()) {
            config.password(password);
        }

        let client = config.connect(NoTls).map_err(|e| PdoError::ConnectionFailed {
            sqlstate: e
                .code()
                .map_or_else(|| SQLSTATE_GENERAL.to_string(), |s| s.code().to_string()),
            message: e.to_string(),
        })?;
        tracing::debug!(host = %self.config.host, port = self.config.port, "pgsql session authenticated");
        self.client = Some(client);
        Ok(())
    }

    fn prepare(&mut self, sql: &str) -> PdoResult<PreparedInfo> {
        let numbered = params::renumber_positional(sql, |n| format!("${n}"));
        let stmt = self.client()?.prepare(&numbered).map_err(pgsql_error)?;
        let id = self.next_id;
        self.next_id += 1;
        let info = PreparedInfo {
            id,
            param_count: stmt.params().len(),
            column_count: stmt.columns().len(),
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
        let wrapped: Vec<TextParam<'_>> = params.iter().map(TextParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = wrapped
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        let client = self.client()?;
        if stmt.columns().is_empty() {
            let affected = client.execute(&stmt, &refs).map_err(pgsql_error)?;
            return Ok(RowSet::affected(affected));
        }

        let rows = client.query(&stmt, &refs).map_err(pgsql_error)?;
        let columns = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>();
        let rows = rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| from_pgsql(row, i))
                    .collect::<PdoResult<Vec<_>>>()
            })
            .collect::<PdoResult<Vec<_>>>()?;
        Ok(RowSet {
            affected_rows: rows.len() as u64,
            columns,
            rows,
        })
    }

    fn close_prepared(&mut self, id: StatementId) {
        self.prepared.remove(&id);
    }

    fn query(&mut self, sql: &str) -> PdoResult<RowSet> {
        let mut set = RowSet::default();
        for message in self.simple(sql)? {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if set.columns.is_empty() {
                        set.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    set.rows.push(
                        (0..row.len())
                            .map(|i| row.get(i).map_or(PdoValue::Null, PdoValue::from))
                            .collect(),
                    );
                }
                SimpleQueryMessage::CommandComplete(n) => set.affected_rows = n,
                _ => {}
            }
        }
        Ok(set)
    }

    fn exec(&mut self, sql: &str) -> PdoResult<u64> {
        let mut affected = 0;
        for message in self.simple(sql)? {
            if let SimpleQueryMessage::CommandComplete(n) = message {
                affected = n;
            }
        }
        Ok(affected)
    }

    fn begin_transaction(&mut self) -> PdoResult<()> {
        self.simple("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> PdoResult<()> {
        self.in_transaction = false;
        self.simple("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> PdoResult<()> {
        self.in_transaction = false;
        self.simple("ROLLBACK").map(|_| ())
    }

    fn in_transaction(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed()) && self.in_transaction
    }

    /// Reference: pgsql_handle_last_id (currval for a named sequence, lastval otherwise)
    fn last_insert_id(&mut self, name: Option<&str>) -> PdoResult<String> {
        let sql = match name {
            Some(seq) => format!("SELECT currval('{}')", seq.replace('\'', "''")),
            None => "SELECT lastval()".to_string(),
        };
        Ok(self.scalar(&sql)?.unwrap_or_default())
    }

    fn server_version(&mut self) -> Option<String> {
        self.scalar("SHOW server_version").ok().flatten()
    }

    fn client_version(&self) -> Option<String> {
        Some("rust-postgres".to_string())
    }

    fn server_info(&mut self) -> Option<String> {
        self.scalar("SELECT version()").ok().flatten()
    }

    fn connection_status(&mut self) -> Option<String> {
        let host = self.config.host.clone();
        self.client
            .as_ref()
            .filter(|c| !c.is_closed())
            .map(|_| format!("Connection OK; waiting to send. ({host})"))
    }
}
