//! Database drivers.
//!
//! Each supported engine implements [`Driver`], which opens a single
//! [`Session`]. A session owns one connection and at most one open
//! transaction; everything a run does goes through it.

mod mssql;
mod postgres;

pub use mssql::SqlServerDriver;
pub use postgres::PostgresDriver;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use migrator_core::config::{DatabaseConfig, DatabaseKind};
use migrator_core::error::{MigrateError, Result};
use migrator_core::script::{AppliedScript, MigrationScript};

use crate::migrations::JournalTable;

/// Boxed future returned by driver and session methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Connects to one kind of database.
pub trait Driver: Send + Sync {
    /// Engine this driver talks to.
    fn kind(&self) -> DatabaseKind;

    /// Open a connection. Fails with [`MigrateError::Connection`].
    fn connect<'a>(&'a self, config: &'a DatabaseConfig) -> BoxFuture<'a, Result<Box<dyn Session>>>;
}

/// A single connection to the target database.
///
/// Methods other than `begin` and `close` run inside the transaction opened
/// by `begin`.
pub trait Session: Send {
    /// Start the run's transaction.
    fn begin(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Execute a script's full text. Fails with [`MigrateError::ScriptExecution`].
    fn execute_batch<'a>(&'a mut self, script: &'a MigrationScript) -> BoxFuture<'a, Result<()>>;

    /// Create the journal table if it does not exist.
    fn ensure_journal<'a>(&'a mut self, table: &'a JournalTable) -> BoxFuture<'a, Result<()>>;

    /// All journal rows.
    fn applied_scripts<'a>(
        &'a mut self,
        table: &'a JournalTable,
    ) -> BoxFuture<'a, Result<Vec<AppliedScript>>>;

    /// Insert one journal row.
    fn record_applied<'a>(
        &'a mut self,
        table: &'a JournalTable,
        name: &'a str,
        applied_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>>;

    fn commit(&mut self) -> BoxFuture<'_, Result<()>>;

    fn rollback(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Release the connection. An open transaction is discarded.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Drivers keyed by the engine they serve.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<DatabaseKind, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry with the PostgreSQL and SQL Server drivers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PostgresDriver));
        registry.register(Arc::new(SqlServerDriver));
        registry
    }

    /// Register a driver, replacing any previous one for the same engine.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers.insert(driver.kind(), driver);
    }

    /// Look up the driver for `kind`.
    pub fn get(&self, kind: DatabaseKind) -> Result<Arc<dyn Driver>> {
        self.drivers.get(&kind).cloned().ok_or_else(|| {
            MigrateError::Configuration(format!("No driver registered for {}", kind))
        })
    }

    pub fn kinds(&self) -> Vec<DatabaseKind> {
        self.drivers.keys().copied().collect()
    }
}
