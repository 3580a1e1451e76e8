//! Migration script and journal record types.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

/// A single migration script discovered on disk.
///
/// Identity is the relative name only. Editing an applied script's content
/// does not make it pending again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// Path relative to the scripts root, `/`-separated (e.g. "SubFolder/003_alter.sql").
    pub name: String,
    /// SQL text.
    pub content: String,
}

impl MigrationScript {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Key used for execution order. Compared byte-wise, never by locale.
    pub fn sort_key(&self) -> &[u8] {
        self.name.as_bytes()
    }
}

impl Ord for MigrationScript {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(other.sort_key())
            .then_with(|| self.content.cmp(&other.content))
    }
}

impl PartialOrd for MigrationScript {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A journal row: a script that was committed by some earlier run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedScript {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}
