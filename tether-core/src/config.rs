//! Configuration file model and the builder that freezes it.
//!
//! # File layout
//!
//! ```yaml
//! settings:
//!   max_processes: 4
//!   status_file: /var/run/tether.status
//!   status_interval: 10
//!   log_file: /var/log/tether.log
//! syncs:
//!   - name: docs
//!     source: /srv/docs
//!     target: backup:/srv/docs
//!     delay: 5
//!     callbacks:
//!       on_startup: "rsync -a {{ source | quote }} {{ target | quote }}"
//!       on_modify: "rsync -a {{ source_path | quote }} {{ target_path | quote }}"
//! ```
//!
//! # Freezing
//!
//! [`ConfigBuilder::build`] consumes the builder: it rejects keys that bypass
//! the `settings:` block, merges command-line overrides over file settings,
//! fills defaults and returns a [`Config`] with no mutating API.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{EventKind, MonitorKind, SyncName};

pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_DELAY_SECS: u64 = 15;
pub const DEFAULT_MAX_DELAYS: usize = 1000;
pub const DEFAULT_UNIT_PROCESSES: usize = 1;

/// Keys accepted inside `settings:`. Used to spot settings written at the top level.
const SETTINGS_KEYS: &[&str] = &[
    "max_processes",
    "status_file",
    "status_interval",
    "log_file",
    "log_level",
    "startup",
];

// ---------------------------------------------------------------------------
// 1. Settings
// ---------------------------------------------------------------------------

/// Global settings as written in the file or given on the command line.
///
/// Every field is optional so the same shape serves as a command-line overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Global ceiling on concurrently running workers. Absent = unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_file: Option<PathBuf>,
    /// Minimum seconds between two status-file writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Shell command run once before the first dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<String>,
}

impl Settings {
    /// Overlay `over` on top of `self`; every key present in `over` wins.
    pub fn overlay(self, over: Settings) -> Settings {
        Settings {
            max_processes: over.max_processes.or(self.max_processes),
            status_file: over.status_file.or(self.status_file),
            status_interval: over.status_interval.or(self.status_interval),
            log_file: over.log_file.or(self.log_file),
            log_level: over.log_level.or(self.log_level),
            startup: over.startup.or(self.startup),
        }
    }
}

/// Settings after merge and defaults. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSettings {
    pub max_processes: Option<usize>,
    pub status_file: Option<PathBuf>,
    pub status_interval: Duration,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub startup: Option<String>,
}

// ---------------------------------------------------------------------------
// 2. Sync entries
// ---------------------------------------------------------------------------

/// Raw callback bodies for one sync, compiled at initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackBodies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_attrib: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_modify: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_move: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_startup: Option<String>,
}

impl CallbackBodies {
    /// Body configured for the slot handling `kind`.
    pub fn get(&self, kind: EventKind) -> Option<&str> {
        let slot = match kind {
            EventKind::Init => &self.on_startup,
            EventKind::Attrib => &self.on_attrib,
            EventKind::Create => &self.on_create,
            EventKind::Delete => &self.on_delete,
            EventKind::Modify => &self.on_modify,
            EventKind::Move => &self.on_move,
        };
        slot.as_deref()
    }

    /// Configured `(kind, body)` pairs in slot order.
    pub fn slots(&self) -> impl Iterator<Item = (EventKind, &str)> + '_ {
        EventKind::all()
            .iter()
            .filter_map(move |kind| self.get(*kind).map(|body| (*kind, body)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots().next().is_none()
    }
}

fn default_delay() -> u64 {
    DEFAULT_DELAY_SECS
}

fn default_max_delays() -> usize {
    DEFAULT_MAX_DELAYS
}

fn default_unit_processes() -> usize {
    DEFAULT_UNIT_PROCESSES
}

fn default_init() -> bool {
    true
}

/// One configured watch root mirrored to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub name: SyncName,
    /// Directory to watch.
    pub source: PathBuf,
    /// Opaque to the daemon; may be a local path or `host:path`.
    pub target: String,
    #[serde(default)]
    pub monitor: MonitorKind,
    /// Seconds an event waits before its action becomes due.
    #[serde(rename = "delay", default = "default_delay")]
    pub delay_secs: u64,
    /// Once more delays than this are waiting, all of them are due.
    #[serde(default = "default_max_delays")]
    pub max_delays: usize,
    /// Workers this unit may run at the same time.
    #[serde(default = "default_unit_processes")]
    pub max_processes: usize,
    /// Run `on_startup` once the loop starts.
    #[serde(default = "default_init")]
    pub init: bool,
    /// Worker exit codes that put the action back in the queue.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_exit_codes: Vec<i32>,
    #[serde(default)]
    pub callbacks: CallbackBodies,
}

impl SyncConfig {
    /// A sync with default tuning and no callbacks.
    pub fn new(
        name: impl Into<SyncName>,
        source: impl Into<PathBuf>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            target: target.into(),
            monitor: MonitorKind::default(),
            delay_secs: DEFAULT_DELAY_SECS,
            max_delays: DEFAULT_MAX_DELAYS,
            max_processes: DEFAULT_UNIT_PROCESSES,
            init: true,
            retry_exit_codes: Vec::new(),
            callbacks: CallbackBodies::default(),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

// ---------------------------------------------------------------------------
// 3. File model
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    syncs: Vec<SyncConfig>,
    /// Anything else at the top level; rejected by [`ConfigBuilder::build`].
    #[serde(flatten)]
    stray: BTreeMap<String, serde_yaml::Value>,
}

// ---------------------------------------------------------------------------
// 4. Builder
// ---------------------------------------------------------------------------

/// Collects file settings, command-line overrides and syncs.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    origin: Option<PathBuf>,
    file: Settings,
    overrides: Settings,
    syncs: Vec<SyncConfig>,
    stray: Vec<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a YAML configuration file.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents, path)
    }

    /// Parse YAML already in memory; `origin` is only used for diagnostics.
    pub fn from_yaml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        Ok(Self {
            origin: Some(origin.to_path_buf()),
            file: file.settings,
            overrides: Settings::default(),
            syncs: file.syncs,
            stray: file.stray.into_keys().collect(),
        })
    }

    /// Replace the file-level settings.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.file = settings;
        self
    }

    /// Command-line settings; these win over the file on every key.
    pub fn overrides(mut self, overrides: Settings) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.syncs.push(sync);
        self
    }

    /// Validate, merge and default. The builder is gone afterwards.
    pub fn build(self) -> Result<Config, ConfigError> {
        if let Some(key) = self.stray.into_iter().next() {
            return Err(if SETTINGS_KEYS.contains(&key.as_str()) {
                ConfigError::SettingOutsideBlock { key }
            } else {
                ConfigError::UnknownKey { key }
            });
        }

        let merged = self.file.overlay(self.overrides);
        if merged.max_processes == Some(0) {
            return Err(invalid("max_processes", "must be at least 1"));
        }
        if merged.status_interval == Some(0) {
            return Err(invalid("status_interval", "must be at least 1 second"));
        }

        let mut seen = HashSet::new();
        for sync in &self.syncs {
            if !seen.insert(sync.name.clone()) {
                return Err(ConfigError::DuplicateSync {
                    name: sync.name.0.clone(),
                });
            }
            if sync.max_processes == 0 {
                return Err(invalid(
                    &format!("syncs.{}.max_processes", sync.name),
                    "must be at least 1",
                ));
            }
        }

        let settings = ResolvedSettings {
            max_processes: merged.max_processes,
            status_file: merged.status_file,
            status_interval: merged
                .status_interval
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_STATUS_INTERVAL),
            log_file: merged.log_file,
            log_level: merged.log_level,
            startup: merged.startup,
        };

        Ok(Config {
            origin: self.origin,
            settings,
            syncs: self.syncs,
        })
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// 5. Frozen configuration
// ---------------------------------------------------------------------------

/// Finalized configuration. There is no way to add or change keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    origin: Option<PathBuf>,
    settings: ResolvedSettings,
    syncs: Vec<SyncConfig>,
}

impl Config {
    pub fn settings(&self) -> &ResolvedSettings {
        &self.settings
    }

    /// Sync entries in file order.
    pub fn syncs(&self) -> &[SyncConfig] {
        &self.syncs
    }

    /// File the configuration was loaded from, if any.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Config, ConfigError> {
        ConfigBuilder::from_yaml_str(yaml, Path::new("inline.yaml"))?.build()
    }

    #[test]
    fn defaults_fill_unset_settings() {
        let config = parse("syncs: []\n").expect("parse");
        assert_eq!(config.settings().status_interval, DEFAULT_STATUS_INTERVAL);
        assert_eq!(config.settings().max_processes, None);
        assert!(config.syncs().is_empty());
    }

    #[test]
    fn sync_entry_defaults() {
        let config = parse(
            "syncs:\n  - name: docs\n    source: /srv/docs\n    target: /mnt/docs\n",
        )
        .expect("parse");
        let sync = &config.syncs()[0];
        assert_eq!(sync.monitor, MonitorKind::Inotify);
        assert_eq!(sync.delay(), Duration::from_secs(DEFAULT_DELAY_SECS));
        assert_eq!(sync.max_processes, 1);
        assert!(sync.init);
        assert!(sync.callbacks.is_empty());
    }

    #[test]
    fn callback_slots_follow_event_kinds() {
        let bodies = CallbackBodies {
            on_startup: Some("init".into()),
            on_move: Some("mv".into()),
            ..Default::default()
        };
        let slots: Vec<_> = bodies.slots().collect();
        assert_eq!(slots, vec![(EventKind::Init, "init"), (EventKind::Move, "mv")]);
        assert_eq!(bodies.get(EventKind::Create), None);
    }

    #[test]
    fn overlay_prefers_override() {
        let file = Settings {
            max_processes: Some(2),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        let cli = Settings {
            max_processes: Some(8),
            ..Default::default()
        };
        let merged = file.overlay(cli);
        assert_eq!(merged.max_processes, Some(8));
        assert_eq!(merged.log_level.as_deref(), Some("debug"));
    }
}
