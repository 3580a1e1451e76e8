//! Migration runner.
//!
//! Applies every pending script of a run inside one transaction. A run either
//! commits all of its pending scripts together with their journal rows, or
//! rolls back and leaves the database as it found it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use migrator_core::config::MigrationConfig;
use migrator_core::error::Result;
use migrator_core::result::MigrationResult;
use migrator_core::script::{AppliedScript, MigrationScript};
use tracing::{debug, info, warn};

use super::discovery::discover_scripts;
use super::journal::{Journal, JournalTable};
use crate::db::{Driver, DriverRegistry, Session};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Discovering,
    Filtering,
    Executing,
    Committing,
    RollingBack,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Discovering => "discovering",
            RunState::Filtering => "filtering",
            RunState::Executing => "executing",
            RunState::Committing => "committing",
            RunState::RollingBack => "rolling_back",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Applied and pending scripts, as seen without running anything.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Journal rows, including scripts no longer on disk.
    pub applied: Vec<AppliedScript>,
    /// Discovered scripts not yet in the journal, in execution order.
    pub pending: Vec<String>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Runs migrations for one configuration.
pub struct MigrationRunner {
    config: MigrationConfig,
    driver: Arc<dyn Driver>,
    state: RunState,
}

impl MigrationRunner {
    /// Runner using the default driver for the configured engine.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        Self::with_registry(config, &DriverRegistry::with_defaults())
    }

    /// Runner resolving its driver from `registry`.
    pub fn with_registry(config: MigrationConfig, registry: &DriverRegistry) -> Result<Self> {
        let driver = registry.get(config.database.kind)?;
        Ok(Self::with_driver(config, driver))
    }

    pub fn with_driver(config: MigrationConfig, driver: Arc<dyn Driver>) -> Self {
        Self {
            config,
            driver,
            state: RunState::Idle,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Apply all pending scripts.
    ///
    /// The error is carried in the result, not logged; reporting it is up to
    /// the caller.
    pub async fn run(&mut self) -> MigrationResult {
        let outcome = self.run_inner().await;

        match &outcome {
            Ok(applied) if applied.is_empty() => info!("Database is up to date"),
            Ok(applied) => info!("Applied {} migration(s)", applied.len()),
            Err(e) => {
                self.transition(RunState::Failed);
                debug!(kind = e.kind(), "Migration run rolled back");
            }
        }

        MigrationResult::from(outcome)
    }

    async fn run_inner(&mut self) -> Result<Vec<String>> {
        self.transition(RunState::Discovering);
        let scripts = discover_scripts(&self.config.scripts)?;
        info!(
            "Found {} script(s) in {}",
            scripts.len(),
            self.config.scripts.path.display()
        );

        self.transition(RunState::Filtering);
        let mut session = self.driver.connect(&self.config.database).await?;
        if let Err(e) = session.begin().await {
            session.close().await;
            return Err(e);
        }

        match self.apply_pending(session.as_mut(), &scripts).await {
            Ok(applied) => {
                self.transition(RunState::Committing);
                let committed = session.commit().await;
                session.close().await;
                committed?;

                self.transition(RunState::Succeeded);
                Ok(applied)
            }
            Err(e) => {
                self.transition(RunState::RollingBack);
                if let Err(rollback_err) = session.rollback().await {
                    warn!("Failed to roll back migration transaction: {}", rollback_err);
                }
                session.close().await;
                Err(e)
            }
        }
    }

    async fn apply_pending(
        &mut self,
        session: &mut dyn Session,
        scripts: &[MigrationScript],
    ) -> Result<Vec<String>> {
        let mut journal = Journal::new(JournalTable::from_config(&self.config));
        journal.load(session).await?;

        let pending: Vec<&MigrationScript> = scripts
            .iter()
            .filter(|script| !journal.is_applied(&script.name))
            .collect();
        debug!(
            "{} pending, {} already applied",
            pending.len(),
            scripts.len() - pending.len()
        );

        self.transition(RunState::Executing);
        let mut applied = Vec::with_capacity(pending.len());

        for script in pending {
            info!("Applying migration: {}", script.name);
            let start = Instant::now();

            if script.content.trim().is_empty() {
                debug!("Script {} is empty, recording only", script.name);
            } else {
                session.execute_batch(script).await?;
            }
            journal.mark_applied(session, &script.name, Utc::now()).await?;

            info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Migration applied: {}", script.name
            );
            applied.push(script.name.clone());
        }

        Ok(applied)
    }

    /// Report applied and pending scripts without executing any.
    ///
    /// The journal is read inside a transaction that is always rolled back,
    /// so a fresh database is left without a journal table.
    pub async fn status(&self) -> Result<MigrationStatus> {
        let scripts = discover_scripts(&self.config.scripts)?;

        let mut session = self.driver.connect(&self.config.database).await?;
        if let Err(e) = session.begin().await {
            session.close().await;
            return Err(e);
        }

        let mut journal = Journal::new(JournalTable::from_config(&self.config));
        let loaded = journal.load(session.as_mut()).await;

        if let Err(e) = session.rollback().await {
            warn!("Failed to roll back status transaction: {}", e);
        }
        session.close().await;
        loaded?;

        let pending = scripts
            .into_iter()
            .filter(|script| !journal.is_applied(&script.name))
            .map(|script| script.name)
            .collect();

        Ok(MigrationStatus {
            applied: journal.entries(),
            pending,
        })
    }

    fn transition(&mut self, next: RunState) {
        debug!("Migration run: {} -> {}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;
    use migrator_core::config::DatabaseKind;
    use migrator_core::error::MigrateError;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, sql: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, sql).unwrap();
    }

    fn runner(dir: &Path, driver: &MockDriver) -> MigrationRunner {
        let config = MigrationConfig::new(DatabaseKind::PostgreSql, "mock://", dir);
        MigrationRunner::with_driver(config, Arc::new(driver.clone()))
    }

    #[tokio::test]
    async fn test_applies_scripts_in_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "SubFolder/003_AlterTable.sql", "ALTER TABLE test_table ADD c INT;");
        write(dir.path(), "002_InsertData.sql", "INSERT INTO test_table VALUES (1);");
        write(dir.path(), "001_CreateTestTable.sql", "CREATE TABLE test_table (id INT);");

        let driver = MockDriver::new();
        let mut runner = runner(dir.path(), &driver);
        let result = runner.run().await;

        assert_eq!(result.exit_code(), 0);
        assert_eq!(runner.state(), RunState::Succeeded);
        assert_eq!(
            result.applied(),
            ["001_CreateTestTable.sql", "002_InsertData.sql", "SubFolder/003_AlterTable.sql"]
        );
        assert_eq!(
            driver.executed().await,
            [
                "CREATE TABLE test_table (id INT);",
                "INSERT INTO test_table VALUES (1);",
                "ALTER TABLE test_table ADD c INT;",
            ]
        );
        assert_eq!(
            driver.journal_names().await,
            ["001_CreateTestTable.sql", "002_InsertData.sql", "SubFolder/003_AlterTable.sql"]
        );
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_CreateTestTable.sql", "CREATE TABLE test_table (id INT);");
        write(dir.path(), "002_InsertData.sql", "INSERT INTO test_table VALUES (1);");

        let driver = MockDriver::new();
        let first = runner(dir.path(), &driver).run().await;
        assert_eq!(first.exit_code(), 0);

        let second = runner(dir.path(), &driver).run().await;
        assert_eq!(second.exit_code(), 0);
        assert!(second.applied().is_empty());
        assert_eq!(driver.executed().await.len(), 2);
    }

    #[tokio::test]
    async fn test_only_new_scripts_run() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_a.sql", "SELECT 1;");

        let driver = MockDriver::new();
        assert_eq!(runner(dir.path(), &driver).run().await.exit_code(), 0);

        write(dir.path(), "002_b.sql", "SELECT 2;");
        let result = runner(dir.path(), &driver).run().await;
        assert_eq!(result.applied(), ["002_b.sql"]);
        assert_eq!(driver.executed().await, ["SELECT 1;", "SELECT 2;"]);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_whole_run() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_CreateTestTable.sql", "CREATE TABLE test_table (id INT);");
        write(dir.path(), "002_Invalid.sql", "CREATE TABLE INVALID (");
        write(dir.path(), "003_Never.sql", "SELECT 3;");

        let driver = MockDriver::new().fail_on("INVALID");
        let mut runner = runner(dir.path(), &driver);
        let result = runner.run().await;

        assert_eq!(result.exit_code(), -1);
        assert_eq!(runner.state(), RunState::Failed);
        assert!(result.applied().is_empty());
        assert!(matches!(
            result.error(),
            Some(MigrateError::ScriptExecution { script, .. }) if script == "002_Invalid.sql"
        ));

        // Nothing from the run persisted, not even the journal table
        assert!(driver.executed().await.is_empty());
        assert!(!driver.journal_exists().await);
        // Execution stopped at the failing script
        assert_eq!(driver.attempted(), 2);
        assert_eq!(driver.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_only_invalid_script_leaves_database_untouched() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "999_InvalidSql.sql", "THIS IS INVALID SQL");

        let driver = MockDriver::new().fail_on("INVALID");
        let result = runner(dir.path(), &driver).run().await;

        assert_eq!(result.exit_code(), -1);
        assert!(!driver.journal_exists().await);
        assert!(driver.journal_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_runs() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_a.sql", "SELECT 1;");

        let driver = MockDriver::new().fail_on("INVALID");
        assert_eq!(runner(dir.path(), &driver).run().await.exit_code(), 0);

        write(dir.path(), "002_b.sql", "SELECT 2;");
        write(dir.path(), "003_c.sql", "INVALID");
        assert_eq!(runner(dir.path(), &driver).run().await.exit_code(), -1);

        assert_eq!(driver.journal_names().await, ["001_a.sql"]);
        assert_eq!(driver.executed().await, ["SELECT 1;"]);
    }

    #[tokio::test]
    async fn test_missing_root_fails_before_connecting() {
        let driver = MockDriver::new();
        let mut runner = runner(Path::new("/nonexistent/migrations"), &driver);
        let result = runner.run().await;

        assert_eq!(result.exit_code(), -1);
        assert!(matches!(result.error(), Some(MigrateError::Discovery { .. })));
        assert_eq!(driver.connections(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_script_fails_before_connecting() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_a.sql", "SELECT 1;");
        fs::write(dir.path().join("002_b.sql"), [0xff, 0xfe, 0x00, 0xc3, 0x28]).unwrap();

        let driver = MockDriver::new();
        let mut runner = runner(dir.path(), &driver);
        let result = runner.run().await;

        assert_eq!(result.exit_code(), -1);
        assert_eq!(runner.state(), RunState::Failed);
        assert!(matches!(
            result.error(),
            Some(MigrateError::Discovery { path, .. }) if path.ends_with("002_b.sql")
        ));
        assert_eq!(driver.connections(), 0);
        assert_eq!(driver.attempted(), 0);
        assert!(!driver.journal_exists().await);
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_a.sql", "SELECT 1;");

        let driver = MockDriver::new().refuse_connections();
        let result = runner(dir.path(), &driver).run().await;

        assert_eq!(result.exit_code(), -1);
        assert!(matches!(result.error(), Some(MigrateError::Connection(_))));
    }

    #[tokio::test]
    async fn test_empty_directory_succeeds() {
        let dir = TempDir::new().unwrap();
        let driver = MockDriver::new();
        let result = runner(dir.path(), &driver).run().await;

        assert_eq!(result.exit_code(), 0);
        assert!(result.applied().is_empty());
        assert!(driver.journal_exists().await);
    }

    #[tokio::test]
    async fn test_blank_script_is_recorded() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_blank.sql", "   \n");

        let driver = MockDriver::new();
        let result = runner(dir.path(), &driver).run().await;

        assert_eq!(result.applied(), ["001_blank.sql"]);
        assert!(driver.executed().await.is_empty());
    }

    #[tokio::test]
    async fn test_edited_script_is_not_reapplied() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_a.sql", "SELECT 1;");

        let driver = MockDriver::new();
        runner(dir.path(), &driver).run().await;

        write(dir.path(), "001_a.sql", "SELECT 'changed';");
        let result = runner(dir.path(), &driver).run().await;
        assert!(result.applied().is_empty());
    }

    #[tokio::test]
    async fn test_status_lists_pending_without_writing() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_a.sql", "SELECT 1;");
        write(dir.path(), "002_b.sql", "SELECT 2;");

        let driver = MockDriver::new();
        driver.seed_journal(&["001_a.sql"]).await;

        let status = runner(dir.path(), &driver).status().await.unwrap();
        assert_eq!(status.applied.len(), 1);
        assert_eq!(status.pending, ["002_b.sql"]);
        assert!(!status.is_up_to_date());
        assert!(driver.executed().await.is_empty());
    }

    #[tokio::test]
    async fn test_status_on_fresh_database_creates_nothing() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "001_a.sql", "SELECT 1;");

        let driver = MockDriver::new();
        let status = runner(dir.path(), &driver).status().await.unwrap();
        assert_eq!(status.pending, ["001_a.sql"]);
        assert!(!driver.journal_exists().await);
    }

    #[test]
    fn test_unknown_driver_is_configuration_error() {
        let config = MigrationConfig::new(DatabaseKind::SqlServer, "mock://", ".");
        let err = MigrationRunner::with_registry(config, &DriverRegistry::new())
            .err()
            .unwrap();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Executing.is_terminal());
    }
}
