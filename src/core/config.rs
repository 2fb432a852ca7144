//! Store configuration loaded from `<store root>/fellowship.toml`.

use crate::core::error::FellowshipError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "fellowship.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FellowshipConfig {
    /// SQLite busy timeout applied to write connections.
    pub busy_timeout_secs: u32,
    /// Append broker events to `broker.events.jsonl`.
    pub audit_log: bool,
    /// Re-check every record a cascade touched once it has committed.
    pub verify_after_commit: bool,
    /// Plans with more writes than this are rejected before execution.
    pub max_cascade_writes: usize,
}

impl Default for FellowshipConfig {
    fn default() -> Self {
        Self {
            busy_timeout_secs: 5,
            audit_log: true,
            verify_after_commit: true,
            max_cascade_writes: 20_000,
        }
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// Load config from the store root. No file means defaults.
pub fn load_config(root: &Path) -> Result<FellowshipConfig, FellowshipError> {
    let path = config_path(root);
    if !path.exists() {
        return Ok(FellowshipConfig::default());
    }
    let content = fs::read_to_string(&path).map_err(FellowshipError::IoError)?;
    let config: FellowshipConfig = toml::from_str(&content)
        .map_err(|e| FellowshipError::ConfigError(format!("{}: {}", path.display(), e)))?;
    if config.max_cascade_writes == 0 {
        return Err(FellowshipError::ConfigError(
            "max_cascade_writes must be greater than zero".to_string(),
        ));
    }
    Ok(config)
}
