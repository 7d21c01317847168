use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const CONFIG_DIR_NAME: &str = "tether";
pub const CONFIG_FILE_NAME: &str = "tether.yaml";

/// `<config_root>/tether/tether.yaml`. Pure, no I/O.
pub fn config_path_at(config_root: &Path) -> PathBuf {
    config_root.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Default configuration file, derived from `dirs::config_dir()`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let root = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(config_path_at(&root))
}
