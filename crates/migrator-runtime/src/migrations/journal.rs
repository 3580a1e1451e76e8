//! Applied-script journal.
//!
//! The journal is a table inside the target database holding one row per
//! script that a committed run applied. It is read and written only through
//! the run's [`Session`], so its rows commit or roll back with the scripts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use migrator_core::config::MigrationConfig;
use migrator_core::error::Result;
use migrator_core::script::AppliedScript;
use tracing::debug;

use crate::db::Session;

/// Location of the journal table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalTable {
    schema: Option<String>,
    name: String,
}

impl JournalTable {
    pub fn new(schema: Option<impl Into<String>>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.map(Into::into),
            name: name.into(),
        }
    }

    /// Table configured for `config`, with engine defaults filled in.
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.journal_schema(), config.journal_table())
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// In-run view of the journal.
pub struct Journal {
    table: JournalTable,
    applied: BTreeMap<String, DateTime<Utc>>,
}

impl Journal {
    pub fn new(table: JournalTable) -> Self {
        Self {
            table,
            applied: BTreeMap::new(),
        }
    }

    pub fn table(&self) -> &JournalTable {
        &self.table
    }

    /// Create the table if absent and load its rows.
    pub async fn load(&mut self, session: &mut dyn Session) -> Result<()> {
        session.ensure_journal(&self.table).await?;

        let rows = session.applied_scripts(&self.table).await?;
        debug!("Journal holds {} applied scripts", rows.len());

        self.applied = rows
            .into_iter()
            .map(|row| (row.name, row.applied_at))
            .collect();
        Ok(())
    }

    pub fn is_applied(&self, name: &str) -> bool {
        self.applied.contains_key(name)
    }

    /// Record `name` as applied at `applied_at`.
    ///
    /// Must be called in the same transaction that executed the script.
    pub async fn mark_applied(
        &mut self,
        session: &mut dyn Session,
        name: &str,
        applied_at: DateTime<Utc>,
    ) -> Result<()> {
        session.record_applied(&self.table, name, applied_at).await?;
        self.applied.insert(name.to_string(), applied_at);
        Ok(())
    }

    /// Journal rows ordered by script name.
    pub fn entries(&self) -> Vec<AppliedScript> {
        self.applied
            .iter()
            .map(|(name, applied_at)| AppliedScript {
                name: name.clone(),
                applied_at: *applied_at,
            })
            .collect()
    }
}
