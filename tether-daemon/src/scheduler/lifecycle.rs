//! One-time initialization and the startup collector.

use std::collections::BTreeSet;

use tether_callback::Translator;
use tether_core::{Config, MonitorKind, Pid, WorkerCommand};
use tether_sync::Spawner;

use super::{DaemonStatus, ProcessAccounting, Scheduler};
use crate::error::{io_err, DaemonError};
use crate::logging::LogHandle;
use crate::monitor::MonitorBackend;

/// User-supplied work run once before the first cycle.
pub type StartupHook = Box<dyn FnOnce(&mut StartupContext<'_>) -> Result<(), DaemonError>>;

/// Collaborators for [`Scheduler::initialize`].
pub struct Startup<'a> {
    pub hook: Option<StartupHook>,
    pub translator: &'a Translator,
    pub monitor: &'a mut dyn MonitorBackend,
    /// `None` keeps logging in bootstrap mode.
    pub logging: Option<&'a LogHandle>,
}

/// Workers spawned by the startup hook. Any non-zero exit among them is fatal.
#[derive(Debug, Default)]
pub struct StartupCollector {
    pending: BTreeSet<Pid>,
}

impl StartupCollector {
    fn track(&mut self, pid: Pid) {
        self.pending.insert(pid);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Claim `pid` if it is a startup worker.
    pub fn collect(&mut self, pid: Pid, exit_code: i32) -> Result<bool, DaemonError> {
        if !self.pending.remove(&pid) {
            return Ok(false);
        }
        if exit_code != 0 {
            return Err(DaemonError::StartupWorkerFailed {
                pid,
                code: exit_code,
            });
        }
        tracing::debug!(pid = %pid, "startup worker finished");
        Ok(true)
    }
}

/// What the startup hook may touch.
pub struct StartupContext<'a> {
    config: &'a Config,
    processes: &'a mut ProcessAccounting,
    collector: &'a mut StartupCollector,
}

impl StartupContext<'_> {
    pub fn config(&self) -> &Config {
        self.config
    }

    /// Start a worker whose exit is checked by the startup collector.
    pub fn spawn(&mut self, command: &WorkerCommand) -> Result<Pid, DaemonError> {
        let pid = self
            .processes
            .spawn(command)
            .map_err(|e| io_err(&command.program, e))?;
        self.collector.track(pid);
        tracing::info!(pid = %pid, "startup worker started");
        Ok(pid)
    }
}

impl Scheduler {
    /// Bring the scheduler from `Init` to `Run`.
    ///
    /// The startup hook runs only when `first_time` is set; a reload skips
    /// it. The configuration was frozen and defaulted when it was built, so
    /// no settings can change past this point.
    pub fn initialize(&mut self, first_time: bool, startup: Startup<'_>) -> Result<(), DaemonError> {
        if self.status != DaemonStatus::Init {
            return Err(DaemonError::Consistency(format!(
                "initialize called in status {:?}",
                self.status
            )));
        }
        let Startup {
            hook,
            translator,
            monitor,
            logging,
        } = startup;

        if first_time {
            if let Some(hook) = hook {
                let mut ctx = StartupContext {
                    config: &self.config,
                    processes: &mut self.processes,
                    collector: &mut self.startup,
                };
                hook(&mut ctx)?;
            }
        }

        self.last_reported_waiting = None;

        if let Some(logging) = logging {
            logging.apply(self.config.settings())?;
        }

        if self.registry.is_empty() {
            return Err(DaemonError::NothingToWatch);
        }

        self.status = DaemonStatus::Run;

        for (index, unit) in self.registry.iter_mut().enumerate() {
            let config = unit.config();
            let callbacks = translator.translate(&config.name, &config.callbacks)?;
            match &config.monitor {
                MonitorKind::Inotify => monitor.watch(index, config)?,
                other => {
                    return Err(DaemonError::UnsupportedMonitor {
                        sync: config.name.clone(),
                        monitor: other.clone(),
                    })
                }
            }
            let init = config.init;
            tracing::info!(
                sync = %config.name,
                callbacks = callbacks.len(),
                init,
                "sync initialized"
            );
            unit.install_callbacks(callbacks);
            if init {
                unit.queue_init();
            }
        }
        Ok(())
    }
}
