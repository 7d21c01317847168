//! The scheduler core: lifecycle, dispatch, process accounting and alarms.
//!
//! All entry points take `&mut self` and are called from one driving loop,
//! so no locking is needed around the counters and cursor.
//!
//! ```text
//!   initialize ──► Init ──► Run ──overflow──► Fade ──drained──► exit
//! ```

mod alarm;
mod dispatch;
mod lifecycle;
mod processes;
mod registry;

use std::time::{Duration, Instant};

use serde::Serialize;

use tether_core::{Config, Pid};
use tether_sync::{FsEvent, SyncUnit};

use crate::alarms::UserAlarms;
use crate::error::DaemonError;
use crate::status::StatusFile;

pub use lifecycle::{Startup, StartupCollector, StartupContext, StartupHook};
pub use processes::{Launcher, ProcessAccounting};
pub use registry::SyncRegistry;

/// Minimum spacing of "waiting for N processes" messages while fading.
pub const WAITING_REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    Init,
    Run,
    Fade,
}

pub struct Scheduler {
    config: Config,
    status: DaemonStatus,
    processes: ProcessAccounting,
    registry: SyncRegistry,
    startup: StartupCollector,
    status_file: Option<StatusFile>,
    alarms: UserAlarms,
    last_reported_waiting: Option<Instant>,
}

impl Scheduler {
    pub fn new(config: Config, launcher: Box<dyn Launcher>) -> Self {
        let settings = config.settings();
        let processes = ProcessAccounting::new(settings.max_processes, launcher);
        let status_file = settings
            .status_file
            .as_ref()
            .map(|path| StatusFile::new(path, settings.status_interval));
        Self {
            config,
            status: DaemonStatus::Init,
            processes,
            registry: SyncRegistry::default(),
            startup: StartupCollector::default(),
            status_file,
            alarms: UserAlarms::new(),
            last_reported_waiting: None,
        }
    }

    /// Add a unit. Only possible before initialization.
    pub fn register(&mut self, unit: Box<dyn SyncUnit>) -> Result<usize, DaemonError> {
        if self.status != DaemonStatus::Init {
            return Err(DaemonError::Consistency(format!(
                "sync '{}' registered after initialization",
                unit.config().name
            )));
        }
        Ok(self.registry.push(unit))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> DaemonStatus {
        self.status
    }

    pub fn processes(&self) -> &ProcessAccounting {
        &self.processes
    }

    pub fn registry(&self) -> &SyncRegistry {
        &self.registry
    }

    pub fn user_alarms_mut(&mut self) -> &mut UserAlarms {
        &mut self.alarms
    }

    pub fn startup_pending(&self) -> usize {
        self.startup.pending()
    }

    /// The event source lost track of changes. Stop dispatching and drain.
    ///
    /// Only a running scheduler fades; before initialization this is a no-op.
    pub fn overflow(&mut self) {
        if self.status == DaemonStatus::Init {
            tracing::debug!("overflow before initialization ignored");
            return;
        }
        tracing::warn!(
            running = self.processes.running(),
            "event source overflowed, no new actions will run"
        );
        self.status = DaemonStatus::Fade;
    }

    /// Account for a finished worker and hand it to its owner.
    ///
    /// Units are asked in registration order and the first claim wins; the
    /// startup collector is asked last.
    pub fn process_exited(&mut self, pid: Pid, exit_code: i32) -> Result<(), DaemonError> {
        self.processes.exited(pid)?;
        for unit in self.registry.iter_mut() {
            if unit.collect(pid, exit_code) {
                return Ok(());
            }
        }
        if !self.startup.collect(pid, exit_code)? {
            tracing::debug!(pid = %pid, exit_code, "exit of unowned process");
        }
        Ok(())
    }

    /// Queue a monitor event on unit `unit`. Dropped outside `Run`.
    pub fn deliver(&mut self, unit: usize, event: FsEvent, now: Instant) {
        if self.status != DaemonStatus::Run {
            return;
        }
        match self.registry.get_mut(unit) {
            Some(unit) => unit.push_event(event, now),
            None => tracing::warn!(unit, "event for unknown sync unit dropped"),
        }
    }
}
