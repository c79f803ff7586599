//! Runtime configuration for the core

use crate::error::{Error, Result};
use crate::path::NormalizedPath;
use crate::sandbox::PathPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_NON_DELETABLE: &[&str] = &[
    "/", "/bin", "/boot", "/dev", "/etc", "/home", "/lib", "/lib64", "/opt", "/proc", "/root",
    "/sbin", "/srv", "/sys", "/tmp", "/usr", "/var",
];

const DEFAULT_SENSITIVE: &[&str] = &[
    "/etc/shadow",
    "/etc/sudoers",
    "/etc/ssh",
    "/root",
    "/proc",
    "/sys",
    "/home/*/.ssh",
    "/home/*/.gnupg",
];

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Folder holding the server's own state (database, caches)
    pub data_folder: NormalizedPath,
    /// Refuse to delete or move the data folder or anything containing it
    pub protect_data_folder: bool,
    /// SQLite database file; relative paths resolve against `data_folder`
    pub database_path: PathBuf,
    pub policy: PolicyConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_folder: default_data_folder(),
            protect_data_folder: true,
            database_path: PathBuf::from("pathwarden.db"),
            policy: PolicyConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {:?}", path);

        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: CoreConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config file {:?}: {}", path, e)))?;

        config.validate()?;
        info!(
            data_folder = %config.data_folder,
            protect_data_folder = config.protect_data_folder,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Check that the policy patterns compile and the database path is usable
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("databasePath must not be empty".to_string()));
        }
        PathPolicy::from_config(&self.policy)?;
        Ok(())
    }

    /// Database file location, resolved against the data folder
    pub fn resolved_database_path(&self) -> PathBuf {
        if self.database_path.is_absolute() {
            self.database_path.clone()
        } else {
            self.data_folder.to_path_buf().join(&self.database_path)
        }
    }
}

/// Protected-path policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    /// Exact paths that may never be deleted or moved
    pub non_deletable: Vec<String>,
    /// Prefixes, or `prefix/*/suffix` patterns with a single wildcard
    pub sensitive: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            non_deletable: DEFAULT_NON_DELETABLE.iter().map(|s| s.to_string()).collect(),
            sensitive: DEFAULT_SENSITIVE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn default_data_folder() -> NormalizedPath {
    dirs::data_dir()
        .map(|dir| dir.join("pathwarden"))
        .and_then(|dir| NormalizedPath::from_path(dir).ok())
        .or_else(|| NormalizedPath::parse("/var/lib/pathwarden").ok())
        .unwrap_or_else(NormalizedPath::root)
}
