//! Global worker-process accounting.

use std::io;

use tether_core::{Pid, WorkerCommand};
use tether_sync::Spawner;

use crate::error::DaemonError;

/// Starts an operating-system process for a worker command.
pub trait Launcher: Send {
    fn launch(&mut self, command: &WorkerCommand) -> io::Result<Pid>;
}

/// Counts running workers against the optional global budget.
///
/// The count only moves on an actual spawn and on an exit notification, so
/// it never drifts from the set of live workers.
pub struct ProcessAccounting {
    running: usize,
    budget: Option<usize>,
    launcher: Box<dyn Launcher>,
}

impl ProcessAccounting {
    pub fn new(budget: Option<usize>, launcher: Box<dyn Launcher>) -> Self {
        Self {
            running: 0,
            budget,
            launcher,
        }
    }

    pub fn running(&self) -> usize {
        self.running
    }

    pub fn budget(&self) -> Option<usize> {
        self.budget
    }

    /// Whether a dispatch round may start. Advisory: a round that starts
    /// below the budget may end above it.
    pub fn has_capacity(&self) -> bool {
        self.budget.map_or(true, |budget| self.running < budget)
    }

    pub fn spawned(&mut self) {
        self.running += 1;
    }

    /// Record one exit. Errors rather than clamping when nothing is running.
    pub fn exited(&mut self, pid: Pid) -> Result<(), DaemonError> {
        self.running = self.running.checked_sub(1).ok_or_else(|| {
            DaemonError::Consistency(format!(
                "exit of pid {pid} with no running processes"
            ))
        })?;
        Ok(())
    }
}

impl Spawner for ProcessAccounting {
    fn spawn(&mut self, command: &WorkerCommand) -> io::Result<Pid> {
        let pid = self.launcher.launch(command)?;
        self.spawned();
        tracing::debug!(pid = %pid, running = self.running, "worker spawned");
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingLauncher(u32);

    impl Launcher for CountingLauncher {
        fn launch(&mut self, _command: &WorkerCommand) -> io::Result<Pid> {
            self.0 += 1;
            Ok(Pid(self.0))
        }
    }

    #[test]
    fn unbounded_budget_always_has_capacity() {
        let mut processes = ProcessAccounting::new(None, Box::new(CountingLauncher(0)));
        for _ in 0..100 {
            processes.spawned();
        }
        assert!(processes.has_capacity());
    }

    #[test]
    fn budget_is_checked_against_running() {
        let mut processes = ProcessAccounting::new(Some(1), Box::new(CountingLauncher(0)));
        assert!(processes.has_capacity());
        let pid = processes
            .spawn(&WorkerCommand::shell("true"))
            .expect("spawn");
        assert_eq!(processes.running(), 1);
        assert!(!processes.has_capacity());
        processes.exited(pid).expect("exited");
        assert!(processes.has_capacity());
    }

    #[test]
    fn exit_without_running_process_is_an_error() {
        let mut processes = ProcessAccounting::new(Some(2), Box::new(CountingLauncher(0)));
        let err = processes.exited(Pid(9)).unwrap_err();
        assert!(matches!(err, DaemonError::Consistency(_)));
        assert_eq!(processes.running(), 0);
    }

    #[test]
    fn failed_launch_is_not_counted() {
        struct Broken;
        impl Launcher for Broken {
            fn launch(&mut self, _command: &WorkerCommand) -> io::Result<Pid> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            }
        }
        let mut processes = ProcessAccounting::new(None, Box::new(Broken));
        assert!(processes.spawn(&WorkerCommand::shell("true")).is_err());
        assert_eq!(processes.running(), 0);
    }
}
