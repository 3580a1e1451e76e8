use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Supported target database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DatabaseKind {
    PostgreSql,
    SqlServer,
}

impl DatabaseKind {
    /// Canonical lowercase name, as accepted in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::PostgreSql => "postgresql",
            DatabaseKind::SqlServer => "sqlserver",
        }
    }

    /// Journal table used when the configuration does not name one.
    pub fn default_journal_table(&self) -> &'static str {
        match self {
            DatabaseKind::PostgreSql => "schemaversions",
            DatabaseKind::SqlServer => "SchemaVersions",
        }
    }

    /// Journal schema used when the configuration does not name one.
    ///
    /// `None` means the connection's search path decides.
    pub fn default_journal_schema(&self) -> Option<&'static str> {
        match self {
            DatabaseKind::PostgreSql => None,
            DatabaseKind::SqlServer => Some("dbo"),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(DatabaseKind::PostgreSql),
            "sqlserver" | "mssql" => Ok(DatabaseKind::SqlServer),
            other => Err(MigrateError::Configuration(format!(
                "Unsupported database type: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DatabaseKind {
    type Error = MigrateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatabaseKind> for String {
    fn from(kind: DatabaseKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Target engine.
    pub kind: DatabaseKind,

    /// Engine-specific connection string.
    pub url: String,

    /// Connection setup timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn new(kind: DatabaseKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}
