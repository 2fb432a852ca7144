//! Store handle for a fellowship state workspace.
//!
//! A store is a directory holding the hierarchy database, the broker audit log
//! and an optional `fellowship.toml`.

use crate::core::config::{self, FellowshipConfig};
use crate::core::error::FellowshipError;
use crate::core::schemas;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable selecting the store root for the CLI.
pub const ROOT_ENV_VAR: &str = "FELLOWSHIP_ROOT";
pub const DEFAULT_ROOT_DIR: &str = ".fellowship";

#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
    pub config: FellowshipConfig,
}

impl Store {
    /// Open a store rooted at `root`, creating the directory and all schemas.
    pub fn open(root: &Path) -> Result<Self, FellowshipError> {
        fs::create_dir_all(root).map_err(FellowshipError::IoError)?;
        let config = config::load_config(root)?;
        let store = Self {
            root: root.to_path_buf(),
            config,
        };
        crate::subsystems::initialize_all_dbs(&store)?;
        Ok(store)
    }

    /// Same as [`Store::open`] with an explicit config instead of the file.
    pub fn open_with_config(root: &Path, config: FellowshipConfig) -> Result<Self, FellowshipError> {
        fs::create_dir_all(root).map_err(FellowshipError::IoError)?;
        let store = Self {
            root: root.to_path_buf(),
            config,
        };
        crate::subsystems::initialize_all_dbs(&store)?;
        Ok(store)
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(schemas::HIERARCHY_DB_NAME)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.root.join(schemas::BROKER_EVENTS_NAME)
    }
}

/// Resolve the CLI store root: `FELLOWSHIP_ROOT`, else `./.fellowship`.
pub fn resolve_root(current_dir: &Path) -> PathBuf {
    match std::env::var(ROOT_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => current_dir.join(DEFAULT_ROOT_DIR),
    }
}
