//! Tether core library: configuration model, domain types, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and small domain enums shared by every crate
//! - [`wake`]: [`WakeTime`], the alarm value folded by the scheduler
//! - [`config`]: file model, [`ConfigBuilder`] and the frozen [`Config`]
//! - [`error`]: [`ConfigError`]
//! - [`paths`]: default configuration location

pub mod config;
pub mod error;
pub mod paths;
pub mod types;
pub mod wake;

pub use config::{CallbackBodies, Config, ConfigBuilder, ResolvedSettings, Settings, SyncConfig};
pub use error::ConfigError;
pub use types::{EventKind, MonitorKind, Pid, SyncName, WorkerCommand};
pub use wake::WakeTime;
