//! PDO value and result types
//!
//! Reference: $PHP_SRC_PATH/ext/pdo/php_pdo_driver.h (enum pdo_param_type,
//! enum pdo_fetch_type)

use indexmap::IndexMap;
use std::fmt;

/// A value bound to a parameter, stored as an attribute, or fetched from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum PdoValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Blob(Vec<u8>),
}

impl PdoValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PdoValue::Int(i) => Some(*i),
            PdoValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PdoValue::Null)
    }

    /// Coerce the value to the representation requested by a bind type.
    /// Reference: $PHP_SRC_PATH/ext/pdo/pdo_stmt.c - really_register_bound_param
    pub fn coerce(self, param_type: ParamType) -> PdoValue {
        match param_type {
            ParamType::Null => PdoValue::Null,
            ParamType::Int => match self {
                PdoValue::Null => PdoValue::Null,
                PdoValue::Int(i) => PdoValue::Int(i),
                PdoValue::Bool(b) => PdoValue::Int(b as i64),
                PdoValue::Float(f) => PdoValue::Int(f as i64),
                PdoValue::Str(s) => PdoValue::Int(s.trim().parse().unwrap_or(0)),
                PdoValue::Blob(b) => {
                    PdoValue::Int(String::from_utf8_lossy(&b).trim().parse().unwrap_or(0))
                }
            },
            ParamType::Bool => match self {
                PdoValue::Null => PdoValue::Null,
                PdoValue::Bool(b) => PdoValue::Bool(b),
                PdoValue::Int(i) => PdoValue::Bool(i != 0),
                PdoValue::Float(f) => PdoValue::Bool(f != 0.0),
                PdoValue::Str(s) => PdoValue::Bool(!(s.is_empty() || s == "0")),
                PdoValue::Blob(b) => PdoValue::Bool(!(b.is_empty() || b == b"0")),
            },
            ParamType::Str => match self {
                PdoValue::Null => PdoValue::Null,
                PdoValue::Str(s) => PdoValue::Str(s),
                PdoValue::Blob(b) => PdoValue::Str(String::from_utf8_lossy(&b).into_owned()),
                other => PdoValue::Str(other.to_string()),
            },
            ParamType::Lob => match self {
                PdoValue::Null => PdoValue::Null,
                PdoValue::Blob(b) => PdoValue::Blob(b),
                PdoValue::Str(s) => PdoValue::Blob(s.into_bytes()),
                other => PdoValue::Blob(other.to_string().into_bytes()),
            },
        }
    }
}

impl fmt::Display for PdoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdoValue::Null => Ok(()),
            PdoValue::Bool(b) => write!(f, "{}", if *b { "1" } else { "" }),
            PdoValue::Int(i) => write!(f, "{i}"),
            PdoValue::Float(v) => write!(f, "{v}"),
            PdoValue::Str(s) => f.write_str(s),
            PdoValue::Blob(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl From<i64> for PdoValue {
    fn from(value: i64) -> Self {
        PdoValue::Int(value)
    }
}

impl From<bool> for PdoValue {
    fn from(value: bool) -> Self {
        PdoValue::Bool(value)
    }
}

impl From<f64> for PdoValue {
    fn from(value: f64) -> Self {
        PdoValue::Float(value)
    }
}

impl From<&str> for PdoValue {
    fn from(value: &str) -> Self {
        PdoValue::Str(value.to_string())
    }
}

impl From<String> for PdoValue {
    fn from(value: String) -> Self {
        PdoValue::Str(value)
    }
}

impl<T: Into<PdoValue>> From<Option<T>> for PdoValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PdoValue::Null, Into::into)
    }
}

/// Parameter data types
/// Reference: $PHP_SRC_PATH/ext/pdo/php_pdo_driver.h - enum pdo_param_type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Null = 0,
    Int = 1,
    Str = 2,
    Lob = 3,
    Bool = 5,
}

impl ParamType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(ParamType::Null),
            1 => Some(ParamType::Int),
            2 => Some(ParamType::Str),
            3 => Some(ParamType::Lob),
            5 => Some(ParamType::Bool),
            _ => None,
        }
    }

    /// Bind type PHP infers for a value passed to `execute()` or left unspecified.
    pub fn of(value: &PdoValue) -> Self {
        match value {
            PdoValue::Null => ParamType::Null,
            PdoValue::Bool(_) => ParamType::Bool,
            PdoValue::Int(_) => ParamType::Int,
            PdoValue::Blob(_) => ParamType::Lob,
            PdoValue::Float(_) | PdoValue::Str(_) => ParamType::Str,
        }
    }
}

/// Parameter identifier: 1-based position or `:name` (colon optional)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamIdentifier {
    Positional(usize),
    Named(String),
}

impl From<usize> for ParamIdentifier {
    fn from(position: usize) -> Self {
        ParamIdentifier::Positional(position)
    }
}

impl From<&str> for ParamIdentifier {
    fn from(name: &str) -> Self {
        ParamIdentifier::Named(name.to_string())
    }
}

/// Fetch modes
/// Reference: $PHP_SRC_PATH/ext/pdo/php_pdo_driver.h - enum pdo_fetch_type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMode {
    Default = 0,
    Assoc = 2,
    Num = 3,
    Both = 4,
    Obj = 5,
    Column = 7,
    Named = 11,
    KeyPair = 12,
}

impl FetchMode {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(FetchMode::Default),
            2 => Some(FetchMode::Assoc),
            3 => Some(FetchMode::Num),
            4 => Some(FetchMode::Both),
            5 => Some(FetchMode::Obj),
            7 => Some(FetchMode::Column),
            11 => Some(FetchMode::Named),
            12 => Some(FetchMode::KeyPair),
            _ => None,
        }
    }
}

/// A fully buffered result produced by a backend query or execute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<PdoValue>>,
    pub affected_rows: u64,
}

impl RowSet {
    /// Result of a statement that produced no columns.
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }
}

/// A row shaped by a fetch mode
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedRow {
    Assoc(IndexMap<String, PdoValue>),
    Num(Vec<PdoValue>),
    Both(IndexMap<String, PdoValue>, Vec<PdoValue>),
    Obj(IndexMap<String, PdoValue>),
    Column(PdoValue),
    Named(IndexMap<String, Vec<PdoValue>>),
    KeyPair(PdoValue, PdoValue),
}

impl FetchedRow {
    /// Look a value up by column name, for the modes that carry names.
    pub fn get(&self, name: &str) -> Option<&PdoValue> {
        match self {
            FetchedRow::Assoc(map) | FetchedRow::Both(map, _) | FetchedRow::Obj(map) => {
                map.get(name)
            }
            FetchedRow::Named(map) => map.get(name).and_then(|values| values.last()),
            _ => None,
        }
    }

    /// Look a value up by 0-based column index, for the modes that carry positions.
    pub fn at(&self, index: usize) -> Option<&PdoValue> {
        match self {
            FetchedRow::Num(values) | FetchedRow::Both(_, values) => values.get(index),
            FetchedRow::Column(value) if index == 0 => Some(value),
            _ => None,
        }
    }
}

/// Column metadata
/// Reference: $PHP_SRC_PATH/ext/pdo/php_pdo_driver.h - struct pdo_column_data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub index: usize,
}
