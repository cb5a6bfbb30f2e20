use php_pdo::{
    ATTR_ERRMODE, DriverRegistry, ERRMODE_EXCEPTION, FetchMode, Pdo, PdoConnection, PdoDriver,
    PdoError, PdoResult, PdoValue, PreparedInfo, RowSet, StatementId, TransactionState,
    dsn::DsnInfo,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Test driver whose commit can be told to fail and whose backend transaction
/// can be dropped on request.
#[derive(Debug)]
struct FlakyDriver;

#[derive(Debug)]
struct FlakyConnection {
    fail_commit: bool,
    in_txn: bool,
}

impl PdoDriver for FlakyDriver {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn open(&self, dsn: &DsnInfo) -> PdoResult<Box<dyn PdoConnection>> {
        Ok(Box::new(FlakyConnection {
            fail_commit: dsn.options().contains_key("fail_commit"),
            in_txn: false,
        }))
    }
}

impl PdoConnection for FlakyConnection {
    fn prepare(&mut self, _sql: &str) -> PdoResult<PreparedInfo> {
        Err(PdoError::driver("prepare not supported"))
    }

    fn execute_prepared(&mut self, _id: StatementId, _params: &[PdoValue]) -> PdoResult<RowSet> {
        Err(PdoError::driver("prepare not supported"))
    }

    fn close_prepared(&mut self, _id: StatementId) {}

    fn query(&mut self, sql: &str) -> PdoResult<RowSet> {
        Ok(RowSet {
            columns: vec!["sql".to_string()],
            rows: vec![vec![PdoValue::from(sql)]],
            affected_rows: 0,
        })
    }

    fn exec(&mut self, sql: &str) -> PdoResult<u64> {
        if sql == "KILL TRANSACTION" {
            self.in_txn = false;
        }
        Ok(1)
    }

    fn begin_transaction(&mut self) -> PdoResult<()> {
        self.in_txn = true;
        Ok(())
    }

    fn commit(&mut self) -> PdoResult<()> {
        self.in_txn = false;
        if self.fail_commit {
            return Err(PdoError::driver_with_state(
                "08S01",
                Some(2013),
                "Lost connection to server during query",
            ));
        }
        Ok(())
    }

    fn rollback(&mut self) -> PdoResult<()> {
        self.in_txn = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_txn
    }

    fn last_insert_id(&mut self, _name: Option<&str>) -> PdoResult<String> {
        Ok("0".to_string())
    }
}

fn flaky(dsn: &str, options: &[(i64, PdoValue)]) -> Pdo {
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(FlakyDriver));
    Pdo::connect_with(&registry, dsn, None, None, options).unwrap()
}

fn file_pair() -> (TempDir, Pdo, Pdo) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.db");
    let dsn = format!("sqlite:{}", path.display());
    let mut writer = Pdo::new(&dsn, None, None, &[]).unwrap();
    writer
        .exec("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();
    let reader = Pdo::new(&dsn, None, None, &[]).unwrap();
    (dir, writer, reader)
}

fn count(pdo: &mut Pdo) -> PdoValue {
    let mut stmt = pdo.query("SELECT COUNT(*) FROM items").unwrap().unwrap();
    stmt.fetch_column(0).unwrap().unwrap()
}

#[test]
fn test_begin_commit_cycle() {
    let mut pdo = Pdo::new("sqlite::memory:", None, None, &[]).unwrap();
    pdo.exec("CREATE TABLE t (a INTEGER)").unwrap();

    assert!(pdo.begin_transaction().unwrap());
    assert!(pdo.in_transaction());
    assert!(matches!(pdo.transaction_state(), TransactionState::Active { .. }));
    pdo.exec("INSERT INTO t VALUES (1)").unwrap();
    assert!(pdo.commit().unwrap());
    assert!(!pdo.in_transaction());
    assert_eq!(pdo.transaction_state(), TransactionState::Idle);

    let mut stmt = pdo.query("SELECT a FROM t").unwrap().unwrap();
    assert_eq!(stmt.fetch_column(0).unwrap(), Some(PdoValue::Int(1)));
}

#[test]
fn test_rollback_discards_changes() {
    let mut pdo = Pdo::new("sqlite::memory:", None, None, &[]).unwrap();
    pdo.exec("CREATE TABLE t (a INTEGER)").unwrap();

    assert!(pdo.begin_transaction().unwrap());
    pdo.exec("INSERT INTO t VALUES (1)").unwrap();
    assert!(pdo.rollback().unwrap());

    let mut stmt = pdo.query("SELECT COUNT(*) FROM t").unwrap().unwrap();
    assert_eq!(stmt.fetch_column(0).unwrap(), Some(PdoValue::Int(0)));
}

#[test]
fn test_redundant_begin_and_idle_finish() {
    let mut pdo = Pdo::new("sqlite::memory:", None, None, &[]).unwrap();
    pdo.exec("CREATE TABLE t (a INTEGER)").unwrap();
    // leave a recorded error behind to prove it is untouched
    assert!(pdo.exec("INSERT INTO missing VALUES (1)").unwrap().is_none());

    assert!(!pdo.commit().unwrap());
    assert!(!pdo.rollback().unwrap());
    assert_eq!(pdo.error_code().as_deref(), Some("42S02"));

    assert!(pdo.begin_transaction().unwrap());
    assert!(!pdo.begin_transaction().unwrap());
    assert!(pdo.begin().unwrap().is_none());
    assert!(pdo.in_transaction());
    assert_eq!(pdo.error_code().as_deref(), Some("42S02"));
    assert!(pdo.rollback().unwrap());
}

#[test]
fn test_uncommitted_changes_invisible_to_other_connection() {
    let (_dir, mut writer, mut reader) = file_pair();

    assert!(writer.begin_transaction().unwrap());
    writer.exec("INSERT INTO items (name) VALUES ('a')").unwrap();
    assert_eq!(count(&mut reader), PdoValue::Int(0));

    assert!(writer.commit().unwrap());
    assert_eq!(count(&mut reader), PdoValue::Int(1));
}

#[test]
fn test_rolled_back_changes_never_visible() {
    let (_dir, mut writer, mut reader) = file_pair();

    assert!(writer.begin_transaction().unwrap());
    writer.exec("INSERT INTO items (name) VALUES ('a')").unwrap();
    assert!(writer.rollback().unwrap());
    assert_eq!(count(&mut reader), PdoValue::Int(0));
    assert_eq!(count(&mut writer), PdoValue::Int(0));
}

#[test]
fn test_autocommit_visible_immediately() {
    let (_dir, mut writer, mut reader) = file_pair();
    writer.exec("INSERT INTO items (name) VALUES ('a')").unwrap();
    assert_eq!(count(&mut reader), PdoValue::Int(1));
}

#[test]
fn test_transaction_handle_routes_and_commits() {
    let (_dir, mut writer, mut reader) = file_pair();

    let txn = writer.begin().unwrap().unwrap();
    assert!(txn.is_active());
    assert_eq!(txn.exec("INSERT INTO items (name) VALUES ('a')").unwrap(), Some(1));
    let mut stmt = txn.query("SELECT name FROM items").unwrap().unwrap();
    assert_eq!(stmt.fetch_column(0).unwrap(), Some(PdoValue::from("a")));
    assert_eq!(count(&mut reader), PdoValue::Int(0));

    assert!(txn.commit().unwrap());
    assert!(!writer.in_transaction());
    assert_eq!(count(&mut reader), PdoValue::Int(1));
}

#[test]
fn test_stale_transaction_handle() {
    let mut pdo = Pdo::new("sqlite::memory:", None, None, &[]).unwrap();
    let txn = pdo.begin().unwrap().unwrap();
    assert!(pdo.commit().unwrap());
    assert!(!txn.is_active());
    assert_eq!(txn.exec("SELECT 1"), Err(PdoError::TransactionFinished));

    // a newer transaction does not revive the old handle
    let current = pdo.begin().unwrap().unwrap();
    assert!(!txn.is_active());
    assert_eq!(txn.rollback(), Err(PdoError::TransactionFinished));
    assert!(pdo.in_transaction());
    assert!(current.rollback().unwrap());
}

#[test]
fn test_handles_fail_after_connection_dropped() {
    let mut pdo = Pdo::new("sqlite::memory:", None, None, &[]).unwrap();
    let txn = pdo.begin().unwrap().unwrap();
    drop(pdo);
    assert!(!txn.is_active());
    assert_eq!(txn.exec("SELECT 1"), Err(PdoError::ConnectionReleased));
    assert_eq!(txn.commit(), Err(PdoError::ConnectionReleased));
}

#[test]
fn test_handles_fail_after_disconnect() {
    let mut pdo = Pdo::new("sqlite::memory:", None, None, &[]).unwrap();
    let txn = pdo.begin().unwrap().unwrap();
    pdo.disconnect();
    assert!(!txn.is_active());
    assert_eq!(txn.exec("SELECT 1"), Err(PdoError::ConnectionReleased));
    assert!(matches!(txn.query("SELECT 1"), Err(PdoError::ConnectionReleased)));
    assert_eq!(txn.rollback(), Err(PdoError::ConnectionReleased));
}

#[test]
fn test_missing_backend_transaction_is_fatal() {
    let mut pdo = flaky("flaky:", &[]);
    assert!(pdo.begin_transaction().unwrap());
    assert_eq!(pdo.exec("KILL TRANSACTION").unwrap(), Some(1));

    assert_eq!(pdo.exec("SELECT 1"), Err(PdoError::TransactionHandleMissing));
    assert!(!pdo.in_transaction());
    // the connection recovers
    assert_eq!(pdo.exec("SELECT 1").unwrap(), Some(1));
}

#[test]
fn test_commit_failure_returns_to_idle() {
    let mut pdo = flaky("flaky:fail_commit=1", &[]);
    assert!(pdo.begin_transaction().unwrap());
    let mut stmt = pdo.query("SELECT 1").unwrap().unwrap();
    assert!(matches!(
        stmt.fetch(FetchMode::Num).unwrap(),
        Some(php_pdo::FetchedRow::Num(_))
    ));

    assert!(!pdo.commit().unwrap());
    assert!(!pdo.in_transaction());
    let (state, code, message) = pdo.error_info();
    assert_eq!(state, "08S01");
    assert_eq!(code, Some(2013));
    assert!(message.unwrap().contains("Lost connection"));

    // a fresh transaction can start
    assert!(pdo.begin_transaction().unwrap());
}

#[test]
fn test_commit_failure_in_exception_mode() {
    let mut pdo = flaky(
        "flaky:fail_commit=1",
        &[(ATTR_ERRMODE, PdoValue::Int(ERRMODE_EXCEPTION))],
    );
    let txn = pdo.begin().unwrap().unwrap();
    assert!(matches!(txn.commit(), Err(PdoError::Sql(info)) if info.sqlstate == "08S01"));
    assert!(!pdo.in_transaction());
}
