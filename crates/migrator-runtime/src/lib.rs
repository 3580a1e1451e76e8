pub mod db;
pub mod migrations;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use db::{Driver, DriverRegistry, PostgresDriver, Session, SqlServerDriver};
pub use migrations::{
    discover_scripts, Journal, JournalTable, MigrationRunner, MigrationStatus, RunState,
    ScriptDiscovery,
};
