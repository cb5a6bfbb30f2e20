use php_pdo::{
    ATTR_CASE, ATTR_CLIENT_VERSION, ATTR_CONNECTION_STATUS, ATTR_DEFAULT_FETCH_MODE,
    ATTR_DRIVER_NAME, ATTR_ERRMODE, ATTR_SERVER_INFO, ATTR_SERVER_VERSION, ATTR_TIMEOUT,
    DriverRegistry, ERRMODE_EXCEPTION, ERRMODE_WARNING, ParamType, Pdo, PdoError, PdoValue,
};

fn memory() -> Pdo {
    Pdo::new("sqlite::memory:", None, None, &[]).unwrap()
}

#[test]
fn test_connect_sqlite_memory() {
    let pdo = memory();
    assert_eq!(pdo.driver_name(), "sqlite");
    assert!(pdo.is_connected());
    assert!(!pdo.in_transaction());
    assert_eq!(pdo.error_code().as_deref(), Some("00000"));
    assert_eq!(pdo.error_info(), ("00000".to_string(), None, None));
}

#[test]
fn test_invalid_dsn() {
    for dsn in ["", "sqlite", ":memory:", "sq lite:x"] {
        assert!(
            matches!(
                Pdo::new(dsn, None, None, &[]),
                Err(PdoError::InvalidDsn(_))
            ),
            "{dsn:?} should be rejected"
        );
    }
}

#[test]
fn test_unknown_driver_is_case_sensitive() {
    assert!(matches!(
        Pdo::new("SQLITE::memory:", None, None, &[]),
        Err(PdoError::DriverNotFound(name)) if name == "SQLITE"
    ));
    assert!(matches!(
        Pdo::new("oracle:db", None, None, &[]),
        Err(PdoError::DriverNotFound(_))
    ));
}

#[test]
fn test_available_drivers() {
    let drivers = Pdo::available_drivers();
    for name in ["mysql", "pgsql", "sqlite"] {
        assert!(drivers.contains(&name), "missing {name}");
    }
}

#[test]
fn test_sqlite_open_failure() {
    let err = Pdo::new("sqlite:/nonexistent-dir/for/sure/db.sqlite", None, None, &[]).unwrap_err();
    assert!(matches!(err, PdoError::ConnectionFailed { .. }), "{err:?}");
}

#[test]
fn test_mysql_unreachable_server() {
    let err = Pdo::new(
        "mysql:host=127.0.0.1;port=1;dbname=test",
        Some("root"),
        Some(""),
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, PdoError::ConnectionFailed { .. }), "{err:?}");
}

#[test]
fn test_pgsql_unreachable_server() {
    let err = Pdo::new(
        "pgsql:host=127.0.0.1;port=1;dbname=test",
        Some("postgres"),
        None,
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, PdoError::ConnectionFailed { .. }), "{err:?}");
}

#[test]
fn test_constructor_options_applied() {
    let pdo = Pdo::new(
        "sqlite::memory:",
        None,
        None,
        &[
            (ATTR_ERRMODE, PdoValue::Int(ERRMODE_WARNING)),
            (ATTR_TIMEOUT, PdoValue::Int(5)),
        ],
    )
    .unwrap();
    assert_eq!(pdo.get_attribute(ATTR_ERRMODE), Some(PdoValue::Int(1)));
    assert_eq!(pdo.get_attribute(ATTR_TIMEOUT), Some(PdoValue::Int(5)));
}

#[test]
fn test_constructor_rejects_invalid_option() {
    let err = Pdo::new(
        "sqlite::memory:",
        None,
        None,
        &[(ATTR_ERRMODE, PdoValue::Int(9))],
    )
    .unwrap_err();
    assert_eq!(
        err,
        PdoError::InvalidAttribute {
            id: ATTR_ERRMODE,
            value: "9".to_string()
        }
    );
}

#[test]
fn test_set_attribute_validation() {
    let mut pdo = memory();
    assert!(!pdo.set_attribute(ATTR_ERRMODE, 7_i64));
    assert_eq!(pdo.get_attribute(ATTR_ERRMODE), Some(PdoValue::Int(0)));
    assert!(!pdo.set_attribute(ATTR_DEFAULT_FETCH_MODE, 0_i64));
    assert_eq!(pdo.get_attribute(ATTR_DEFAULT_FETCH_MODE), Some(PdoValue::Int(4)));
    assert!(pdo.set_attribute(ATTR_CASE, 2_i64));
    assert_eq!(pdo.get_attribute(ATTR_CASE), Some(PdoValue::Int(2)));
    assert!(pdo.set_attribute(4242, "custom"));
    assert_eq!(pdo.get_attribute(4242), Some(PdoValue::from("custom")));
    assert_eq!(pdo.get_attribute(4243), None);
}

#[test]
fn test_computed_attributes() {
    let mut pdo = memory();
    let version = rusqlite::version().to_string();
    assert_eq!(pdo.get_attribute(ATTR_DRIVER_NAME), Some(PdoValue::from("sqlite")));
    assert_eq!(pdo.get_attribute(ATTR_SERVER_VERSION), Some(PdoValue::from(version.as_str())));
    assert_eq!(pdo.get_attribute(ATTR_CLIENT_VERSION), Some(PdoValue::from(version.as_str())));
    // sqlite reports neither, so the driver name stands in
    assert_eq!(pdo.get_attribute(ATTR_SERVER_INFO), Some(PdoValue::from("sqlite")));
    assert_eq!(pdo.get_attribute(ATTR_CONNECTION_STATUS), Some(PdoValue::from("sqlite")));

    // a stored value takes precedence
    assert!(pdo.set_attribute(ATTR_SERVER_INFO, "pinned"));
    assert_eq!(pdo.get_attribute(ATTR_SERVER_INFO), Some(PdoValue::from("pinned")));
}

#[test]
fn test_exec_and_error_state() {
    let mut pdo = memory();
    assert_eq!(pdo.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap(), Some(0));
    assert_eq!(pdo.exec("INSERT INTO t (name) VALUES ('a'), ('b')").unwrap(), Some(2));

    assert_eq!(pdo.exec("INSERT INTO nope VALUES (1)").unwrap(), None);
    let (state, code, message) = pdo.error_info();
    assert_eq!(state, "42S02");
    assert!(code.is_some());
    assert!(message.unwrap().contains("no such table"));

    assert_eq!(pdo.exec("UPDATE t SET name = 'c'").unwrap(), Some(2));
    assert_eq!(pdo.error_code().as_deref(), Some("00000"));
}

#[test]
fn test_error_classification() {
    let mut pdo = memory();
    pdo.exec("CREATE TABLE u (id INTEGER PRIMARY KEY)").unwrap();
    pdo.exec("INSERT INTO u VALUES (1)").unwrap();

    assert!(pdo.exec("INSERT INTO u VALUES (1)").unwrap().is_none());
    assert_eq!(pdo.error_code().as_deref(), Some("23000"));

    assert!(pdo.query("SELEC 1").unwrap().is_none());
    assert_eq!(pdo.error_code().as_deref(), Some("42000"));

    assert!(pdo.prepare("SELECT * FROM missing WHERE id = ?").unwrap().is_none());
    assert_eq!(pdo.error_code().as_deref(), Some("42S02"));
}

#[test]
fn test_exception_mode() {
    let mut pdo = Pdo::new(
        "sqlite::memory:",
        None,
        None,
        &[(ATTR_ERRMODE, PdoValue::Int(ERRMODE_EXCEPTION))],
    )
    .unwrap();
    match pdo.exec("DELETE FROM missing") {
        Err(PdoError::Sql(info)) => {
            assert_eq!(info.sqlstate, "42S02");
            assert!(info.to_string().starts_with("SQLSTATE[42S02]"));
        }
        other => panic!("expected Sql error, got {other:?}"),
    }
    // recorded before being raised
    assert_eq!(pdo.error_code().as_deref(), Some("42S02"));
}

#[test]
fn test_quote_and_last_insert_id() {
    let mut pdo = memory();
    assert_eq!(pdo.quote("it's", ParamType::Str).unwrap(), "'it''s'");
    assert_eq!(pdo.quote("17", ParamType::Int).unwrap(), "17");

    pdo.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
    pdo.exec("INSERT INTO t (name) VALUES ('x')").unwrap();
    pdo.exec("INSERT INTO t (name) VALUES ('y')").unwrap();
    assert_eq!(pdo.last_insert_id(None).unwrap().as_deref(), Some("2"));
}

#[test]
fn test_disconnect() {
    let mut pdo = memory();
    pdo.disconnect();
    assert!(!pdo.is_connected());
    assert_eq!(pdo.exec("SELECT 1"), Err(PdoError::NotConnected));
    assert!(matches!(pdo.query("SELECT 1"), Err(PdoError::NotConnected)));
    assert!(matches!(pdo.prepare("SELECT 1"), Err(PdoError::NotConnected)));
    assert!(matches!(pdo.begin(), Err(PdoError::NotConnected)));
    assert_eq!(pdo.quote("x", ParamType::Str), Err(PdoError::NotConnected));
    // attributes survive
    assert_eq!(pdo.get_attribute(ATTR_SERVER_VERSION), Some(PdoValue::from("sqlite")));
}

#[test]
fn test_registry_snapshot_is_independent() {
    let mut registry = DriverRegistry::empty();
    assert!(matches!(
        Pdo::connect_with(&registry, "sqlite::memory:", None, None, &[]),
        Err(PdoError::DriverNotFound(_))
    ));
    registry.register(std::sync::Arc::new(php_pdo::drivers::sqlite::SqliteDriver));
    assert!(Pdo::connect_with(&registry, "sqlite::memory:", None, None, &[]).is_ok());
}
