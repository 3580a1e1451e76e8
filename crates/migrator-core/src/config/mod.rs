mod database;

pub use database::{DatabaseConfig, DatabaseKind};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{MigrateError, Result};

/// Root configuration for a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Target database.
    pub database: DatabaseConfig,

    /// Where scripts are discovered.
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Applied-script journal location.
    #[serde(default)]
    pub journal: JournalConfig,
}

impl MigrationConfig {
    /// Configuration for `kind` at `url`, scanning `path` with defaults elsewhere.
    pub fn new(kind: DatabaseKind, url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseConfig::new(kind, url),
            scripts: ScriptsConfig {
                path: path.into(),
                ..Default::default()
            },
            journal: JournalConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MigrateError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| MigrateError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Journal table name, falling back to the engine default.
    pub fn journal_table(&self) -> &str {
        self.journal
            .table
            .as_deref()
            .unwrap_or_else(|| self.database.kind.default_journal_table())
    }

    /// Journal schema, falling back to the engine default.
    pub fn journal_schema(&self) -> Option<&str> {
        self.journal
            .schema
            .as_deref()
            .or_else(|| self.database.kind.default_journal_schema())
    }
}

/// Script discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Root directory to scan.
    #[serde(default = "default_scripts_path")]
    pub path: PathBuf,

    /// File extension of migration scripts, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Whether nested directories are scanned.
    #[serde(default = "default_true")]
    pub include_subdirectories: bool,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            path: default_scripts_path(),
            extension: default_extension(),
            include_subdirectories: true,
        }
    }
}

fn default_scripts_path() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_extension() -> String {
    "sql".to_string()
}

fn default_true() -> bool {
    true
}

/// Journal table configuration. Changing either value after the first run
/// orphans the existing history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    pub table: Option<String>,
    pub schema: Option<String>,
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern");

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => result = result.replace(&cap[0], &value),
            Err(_) => warn!("Environment variable {} is not set", var_name),
        }
    }

    result
}
