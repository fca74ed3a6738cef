//! Project-level configuration.
//!
//! A project can pin its exclusions in a `depscope.config.json` next to the
//! lockfile instead of repeating CLI flags. CLI values are merged on top of
//! the file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// The configuration file looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "depscope.config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {details}", path.display())]
    Json { path: PathBuf, details: String },
}

/// Exclusions a project declares once instead of per invocation.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Dependency names excluded from the unused report.
    pub ignore_dep: Vec<String>,
    /// Directory names excluded from the source scan.
    pub ignore_path: Vec<String>,
    /// File names excluded from the source scan.
    pub ignore_file: Vec<String>,
}

impl ProjectConfig {
    /// Loads configuration for `project_dir`.
    ///
    /// An explicitly given path must exist and parse; the conventional
    /// `depscope.config.json` is optional and its absence yields defaults.
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = project_dir.join(CONFIG_FILE_NAME);
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|err| ConfigError::Json {
            path,
            details: err.to_string(),
        })
    }

    /// Returns true if any exclusion list is populated.
    pub fn has_exclusions(&self) -> bool {
        !self.ignore_dep.is_empty() || !self.ignore_path.is_empty() || !self.ignore_file.is_empty()
    }
}

/// Merges the config's ignored dependency names with a comma-separated CLI
/// list into one lookup set. Blank entries are dropped.
pub fn ignore_names(config: &ProjectConfig, cli_list: &str) -> HashSet<String> {
    config
        .ignore_dep
        .iter()
        .map(|name| name.trim())
        .chain(cli_list.split(',').map(str::trim))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
