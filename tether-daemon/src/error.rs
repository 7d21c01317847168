use std::path::PathBuf;

use thiserror::Error;

use tether_core::{MonitorKind, Pid, SyncName};

/// Error surface for the scheduler and its driver. Every variant is fatal.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("configuration error: {0}")]
    Config(#[from] tether_core::ConfigError),

    #[error("callback error: {0}")]
    Callback(#[from] tether_callback::CallbackError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Nothing to watch")]
    NothingToWatch,

    #[error("sync '{sync}': unsupported monitor '{monitor}'")]
    UnsupportedMonitor { sync: SyncName, monitor: MonitorKind },

    #[error("internal consistency error: {0}")]
    Consistency(String),

    #[error("startup worker {pid} failed with exit code {code}")]
    StartupWorkerFailed { pid: Pid, code: i32 },

    #[error("startup hook failed: {0}")]
    StartupHook(String),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
