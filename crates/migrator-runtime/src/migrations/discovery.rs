//! Script discovery.
//!
//! Walks the scripts root and turns every matching file into a
//! [`MigrationScript`] named by its path relative to the root.

use std::path::{Component, Path, PathBuf};

use migrator_core::config::ScriptsConfig;
use migrator_core::error::{MigrateError, Result};
use migrator_core::script::MigrationScript;
use tracing::debug;
use walkdir::WalkDir;

const UTF8_BOM: char = '\u{feff}';

/// Finds migration scripts under a root directory.
#[derive(Debug, Clone)]
pub struct ScriptDiscovery {
    root: PathBuf,
    extension: String,
    recursive: bool,
}

impl ScriptDiscovery {
    /// Discover `.sql` files under `root`, including subdirectories.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "sql".to_string(),
            recursive: true,
        }
    }

    pub fn from_config(config: &ScriptsConfig) -> Self {
        Self::new(&config.path)
            .with_extension(&config.extension)
            .recursive(config.include_subdirectories)
    }

    /// Match files with this extension (case-insensitive, leading dot optional).
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Whether nested directories are scanned.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every matching script, sorted by ordinal name.
    pub fn discover(&self) -> Result<Vec<MigrationScript>> {
        let metadata = std::fs::metadata(&self.root)
            .map_err(|e| MigrateError::discovery(&self.root, e))?;
        if !metadata.is_dir() {
            return Err(MigrateError::discovery(&self.root, "not a directory"));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut scripts = Vec::new();

        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .min_depth(1)
            .max_depth(max_depth)
        {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(self.root.as_path()).to_path_buf();
                MigrateError::discovery(path, e)
            })?;

            if !entry.file_type().is_file() || !self.matches_extension(entry.path()) {
                continue;
            }

            let name = relative_name(&self.root, entry.path())?;
            let content = std::fs::read_to_string(entry.path())
                .map_err(|e| MigrateError::discovery(entry.path(), e))?;
            let content = if content.starts_with(UTF8_BOM) {
                content[UTF8_BOM.len_utf8()..].to_string()
            } else {
                content
            };

            scripts.push(MigrationScript::new(name, content));
        }

        scripts.sort();

        debug!(
            "Discovered {} scripts under {}",
            scripts.len(),
            self.root.display()
        );
        Ok(scripts)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

/// Discover scripts as described by `config`.
pub fn discover_scripts(config: &ScriptsConfig) -> Result<Vec<MigrationScript>> {
    ScriptDiscovery::from_config(config).discover()
}

/// Relative path of `path` under `root`, joined with `/` on every platform.
fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| MigrateError::discovery(path, e))?;

    let mut segments = Vec::new();
    for component in relative.components() {
        if let Component::Normal(segment) = component {
            let segment = segment
                .to_str()
                .ok_or_else(|| MigrateError::discovery(path, "file name is not valid UTF-8"))?;
            segments.push(segment);
        }
    }

    Ok(segments.join("/"))
}
