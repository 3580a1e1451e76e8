pub mod config;
pub mod error;
pub mod result;
pub mod script;

pub use config::{DatabaseConfig, DatabaseKind, JournalConfig, MigrationConfig, ScriptsConfig};
pub use error::{MigrateError, Result};
pub use result::{MigrationResult, EXIT_FAILURE, EXIT_SUCCESS};
pub use script::{AppliedScript, MigrationScript};
