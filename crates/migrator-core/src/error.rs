use std::path::PathBuf;

use thiserror::Error;

/// Core error type for migration runs.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Discovery error at {}: {message}", path.display())]
    Discovery { path: PathBuf, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Script '{script}' failed: {message}")]
    ScriptExecution { script: String, message: String },

    #[error("Journal error: {0}")]
    Journal(String),
}

impl MigrateError {
    /// Build a discovery error for the given path.
    pub fn discovery(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        MigrateError::Discovery {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Build a script execution error for the named script.
    pub fn script(script: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::ScriptExecution {
            script: script.into(),
            message: message.to_string(),
        }
    }

    /// Short machine-friendly label for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrateError::Configuration(_) => "configuration",
            MigrateError::Discovery { .. } => "discovery",
            MigrateError::Connection(_) => "connection",
            MigrateError::ScriptExecution { .. } => "script_execution",
            MigrateError::Journal(_) => "journal",
        }
    }
}

/// Result type alias using MigrateError.
pub type Result<T> = std::result::Result<T, MigrateError>;
