//! Error types for tether-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or finalizing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading the configuration file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error: includes file path and line context from serde_yaml.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A settings key was written at the top level instead of under `settings:`.
    #[error("setting '{key}' must be placed under 'settings:', not at the top level")]
    SettingOutsideBlock { key: String },

    /// A top-level key that is neither `settings` nor `syncs`.
    #[error("unknown top-level configuration key '{key}'")]
    UnknownKey { key: String },

    /// Two sync entries share a name.
    #[error("duplicate sync name '{name}'")]
    DuplicateSync { name: String },

    /// A value is present but out of range.
    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },

    /// `dirs::config_dir()` returned `None`.
    #[error("cannot determine configuration directory; pass --config explicitly")]
    ConfigDirNotFound,
}
