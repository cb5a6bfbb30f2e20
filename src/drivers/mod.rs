//! Driver registry
//!
//! All drivers are compiled in; there is no dynamic loading. A process-wide
//! registry seeded with the built-in drivers backs [`crate::Pdo::new`].

pub mod mysql;
pub mod pgsql;
pub mod sqlite;

use crate::driver::PdoDriver;
use crate::dsn::{self, DsnInfo};
use crate::error::{PdoError, PdoResult};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Maps a DSN driver identifier to its driver (case-sensitive).
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: HashMap<&'static str, Arc<dyn PdoDriver>>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRegistry {
    /// Registry with the built-in sqlite, mysql and pgsql drivers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(sqlite::SqliteDriver));
        registry.register(Arc::new(mysql::MysqlDriver));
        registry.register(Arc::new(pgsql::PgsqlDriver));
        registry
    }

    pub fn empty() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Register a driver under its own name, replacing any previous one.
    pub fn register(&mut self, driver: Arc<dyn PdoDriver>) {
        self.drivers.insert(driver.name(), driver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PdoDriver>> {
        self.drivers.get(name).cloned()
    }

    /// Look a driver up, failing when it is not registered.
    pub fn lookup(&self, name: &str) -> PdoResult<Arc<dyn PdoDriver>> {
        self.get(name)
            .ok_or_else(|| PdoError::DriverNotFound(name.to_string()))
    }

    /// Registered identifiers, sorted.
    pub fn available(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.drivers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn parse_dsn(dsn: &str) -> PdoResult<DsnInfo> {
        dsn::parse(dsn)
    }

    /// The process-wide registry.
    pub fn global() -> &'static RwLock<DriverRegistry> {
        static GLOBAL: OnceLock<RwLock<DriverRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| RwLock::new(DriverRegistry::new()))
    }

    /// Snapshot of the process-wide registry.
    pub fn snapshot() -> DriverRegistry {
        Self::global()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Add a driver to the process-wide registry.
pub fn register_driver(driver: Arc<dyn PdoDriver>) {
    tracing::debug!(driver = driver.name(), "registering pdo driver");
    DriverRegistry::global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(driver);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_registry_creation() {
        let registry = DriverRegistry::new();
        assert!(registry.get("sqlite").is_some());
        assert!(registry.get("mysql").is_some());
        assert!(registry.get("pgsql").is_some());
        assert_eq!(registry.available(), vec!["mysql", "pgsql", "sqlite"]);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = DriverRegistry::new();
        assert!(matches!(
            registry.lookup("SQLite"),
            Err(PdoError::DriverNotFound(name)) if name == "SQLite"
        ));
        assert!(DriverRegistry::empty().lookup("sqlite").is_err());
    }

    #[test]
    fn test_register_driver_updates_global_registry() {
        register_driver(Arc::new(sqlite::SqliteDriver));
        let snapshot = DriverRegistry::snapshot();
        assert!(snapshot.get("sqlite").is_some());
        assert!(snapshot.available().contains(&"pgsql"));
    }

    #[test]
    fn test_parse_dsn() {
        let info = DriverRegistry::parse_dsn("sqlite::memory:").unwrap();
        assert_eq!(info.driver, "sqlite");
        assert_eq!(info.remainder, ":memory:");
    }
}
