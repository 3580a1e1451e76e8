mod discovery;
mod journal;
mod runner;

pub use discovery::{discover_scripts, ScriptDiscovery};
pub use journal::{Journal, JournalTable};
pub use runner::{MigrationRunner, MigrationStatus, RunState};
