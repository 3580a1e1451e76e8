//! Versioned SQL migration runner.
//!
//! Discovers `.sql` scripts under a directory tree, orders them by name, and
//! applies the ones not yet recorded in the database's journal table inside a
//! single transaction.
//!
//! ```no_run
//! use migrator::{DatabaseKind, MigrationConfig, Migrations};
//!
//! # async fn example() -> migrator::Result<()> {
//! let config = MigrationConfig::new(
//!     DatabaseKind::PostgreSql,
//!     "postgres://localhost/app",
//!     "db/migrations",
//! );
//! let code = Migrations::new(config)?.migrate().await;
//! assert_eq!(code, migrator::EXIT_SUCCESS);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::error;

pub use migrator_core::{
    AppliedScript, DatabaseConfig, DatabaseKind, JournalConfig, MigrateError, MigrationConfig,
    MigrationResult, MigrationScript, Result, ScriptsConfig, EXIT_FAILURE, EXIT_SUCCESS,
};
pub use migrator_runtime::{
    discover_scripts, Driver, DriverRegistry, MigrationRunner, MigrationStatus, RunState, Session,
};

/// Entry point for running migrations from a configuration.
pub struct Migrations {
    runner: MigrationRunner,
}

impl Migrations {
    /// Use the built-in driver for the configured engine.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        Ok(Self {
            runner: MigrationRunner::new(config)?,
        })
    }

    /// Use a caller-supplied driver.
    pub fn with_driver(config: MigrationConfig, driver: Arc<dyn Driver>) -> Self {
        Self {
            runner: MigrationRunner::with_driver(config, driver),
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        self.runner.config()
    }

    /// Apply pending scripts and return the structured outcome.
    pub async fn run(&mut self) -> MigrationResult {
        self.runner.run().await
    }

    /// Apply pending scripts and return `0` on success, `-1` on failure.
    ///
    /// A failure is logged at error level.
    pub async fn migrate(&mut self) -> i32 {
        let result = self.run().await;
        if let Some(e) = result.error() {
            error!(kind = e.kind(), "Migration failed: {}", e);
        }
        result.exit_code()
    }

    /// Applied and pending scripts, without executing anything.
    pub async fn status(&self) -> Result<MigrationStatus> {
        self.runner.status().await
    }
}

/// Run migrations for `config`, returning `0` on success and `-1` on failure.
pub async fn migrate(config: MigrationConfig) -> i32 {
    match Migrations::new(config) {
        Ok(mut migrations) => migrations.migrate().await,
        Err(e) => {
            error!(kind = e.kind(), "Migration failed: {}", e);
            EXIT_FAILURE
        }
    }
}

/// Blocking variant of [`migrate`] for callers outside an async runtime.
pub fn migrate_blocking(config: MigrationConfig) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return EXIT_FAILURE;
        }
    };

    runtime.block_on(migrate(config))
}
