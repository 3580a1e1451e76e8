//! In-memory driver for testing.
//!
//! Behaves like a database with transactional DDL: everything a session does
//! is staged and only becomes visible on commit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use migrator_core::config::{DatabaseConfig, DatabaseKind};
use migrator_core::error::{MigrateError, Result};
use migrator_core::script::{AppliedScript, MigrationScript};

use crate::db::{BoxFuture, Driver, Session};
use crate::migrations::JournalTable;

/// Committed contents of the mock database.
#[derive(Debug, Clone, Default)]
struct MockState {
    /// `None` until the journal table is created.
    journal: Option<Vec<AppliedScript>>,
    /// SQL of every committed script, in execution order.
    executed: Vec<String>,
}

/// Mock driver sharing one in-memory database across sessions.
#[derive(Clone)]
pub struct MockDriver {
    kind: DatabaseKind,
    state: Arc<RwLock<MockState>>,
    fail_marker: Option<String>,
    refuse: bool,
    connections: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
    attempted: Arc<AtomicUsize>,
}

impl MockDriver {
    /// Create a mock PostgreSQL driver with an empty database.
    pub fn new() -> Self {
        Self {
            kind: DatabaseKind::PostgreSql,
            state: Arc::new(RwLock::new(MockState::default())),
            fail_marker: None,
            refuse: false,
            connections: Arc::new(AtomicUsize::new(0)),
            open_sessions: Arc::new(AtomicUsize::new(0)),
            attempted: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `kind` instead of PostgreSQL.
    pub fn with_kind(mut self, kind: DatabaseKind) -> Self {
        self.kind = kind;
        self
    }

    /// Fail any script whose SQL contains `marker`.
    pub fn fail_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Make every connection attempt fail.
    pub fn refuse_connections(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Pretend earlier runs applied `names`.
    pub async fn seed_journal(&self, names: &[&str]) {
        let mut state = self.state.write().await;
        let journal = state.journal.get_or_insert_with(Vec::new);
        for name in names {
            journal.push(AppliedScript {
                name: name.to_string(),
                applied_at: Utc::now(),
            });
        }
    }

    pub async fn journal_exists(&self) -> bool {
        self.state.read().await.journal.is_some()
    }

    /// Committed journal names, in insertion order.
    pub async fn journal_names(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .journal
            .as_ref()
            .map(|rows| rows.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default()
    }

    /// SQL of committed scripts.
    pub async fn executed(&self) -> Vec<String> {
        self.state.read().await.executed.clone()
    }

    /// Number of `execute_batch` calls, committed or not.
    pub fn attempted(&self) -> usize {
        self.attempted.load(Ordering::SeqCst)
    }

    /// Connections opened so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Sessions not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for MockDriver {
    fn kind(&self) -> DatabaseKind {
        self.kind
    }

    fn connect<'a>(&'a self, _config: &'a DatabaseConfig) -> BoxFuture<'a, Result<Box<dyn Session>>> {
        Box::pin(async move {
            if self.refuse {
                return Err(MigrateError::Connection("connection refused".to_string()));
            }
            self.connections.fetch_add(1, Ordering::SeqCst);
            self.open_sessions.fetch_add(1, Ordering::SeqCst);

            Ok(Box::new(MockSession {
                driver: self.clone(),
                staged: None,
            }) as Box<dyn Session>)
        })
    }
}

struct MockSession {
    driver: MockDriver,
    staged: Option<MockState>,
}

impl MockSession {
    fn staged(&mut self) -> Result<&mut MockState> {
        self.staged
            .as_mut()
            .ok_or_else(|| MigrateError::Connection("No open transaction".to_string()))
    }
}

impl Session for MockSession {
    fn begin(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let snapshot = self.driver.state.read().await.clone();
            self.staged = Some(snapshot);
            Ok(())
        })
    }

    fn execute_batch<'a>(&'a mut self, script: &'a MigrationScript) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.driver.attempted.fetch_add(1, Ordering::SeqCst);

            if let Some(marker) = &self.driver.fail_marker {
                if script.content.contains(marker.as_str()) {
                    return Err(MigrateError::script(
                        &script.name,
                        format!("syntax error near \"{}\"", marker),
                    ));
                }
            }

            self.staged()?.executed.push(script.content.clone());
            Ok(())
        })
    }

    fn ensure_journal<'a>(&'a mut self, _table: &'a JournalTable) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.staged()?.journal.get_or_insert_with(Vec::new);
            Ok(())
        })
    }

    fn applied_scripts<'a>(
        &'a mut self,
        _table: &'a JournalTable,
    ) -> BoxFuture<'a, Result<Vec<AppliedScript>>> {
        Box::pin(async move {
            let staged = self.staged()?;
            staged
                .journal
                .clone()
                .ok_or_else(|| MigrateError::Journal("journal table does not exist".to_string()))
        })
    }

    fn record_applied<'a>(
        &'a mut self,
        _table: &'a JournalTable,
        name: &'a str,
        applied_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let journal = self
                .staged()?
                .journal
                .as_mut()
                .ok_or_else(|| MigrateError::Journal("journal table does not exist".to_string()))?;

            if journal.iter().any(|row| row.name == name) {
                return Err(MigrateError::Journal(format!(
                    "duplicate journal entry '{}'",
                    name
                )));
            }
            journal.push(AppliedScript {
                name: name.to_string(),
                applied_at,
            });
            Ok(())
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(staged) = self.staged.take() {
                *self.driver.state.write().await = staged;
            }
            Ok(())
        })
    }

    fn rollback(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.staged = None;
            Ok(())
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.driver.open_sessions.fetch_sub(1, Ordering::SeqCst);
        })
    }
}
