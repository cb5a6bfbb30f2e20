//! PHP Data Objects: one connection, statement and transaction API over
//! pluggable SQL drivers (SQLite, MySQL, PostgreSQL).

pub mod attributes;
pub mod connection;
pub mod driver;
pub mod drivers;
pub mod dsn;
pub mod error;
pub mod params;
pub mod session;
pub mod statement;
pub mod transaction;
pub mod types;

pub use attributes::*;
pub use connection::Pdo;
pub use driver::{PdoConnection, PdoDriver, PreparedInfo, StatementId};
pub use drivers::{DriverRegistry, register_driver};
pub use error::{ErrorInfo, PdoError, PdoResult};
pub use session::{SessionState, TransactionState};
pub use statement::PdoStatement;
pub use transaction::Transaction;
pub use types::{ColumnMeta, FetchMode, FetchedRow, ParamIdentifier, ParamType, PdoValue, RowSet};
