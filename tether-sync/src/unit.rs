//! The capability interface between the scheduler and a sync unit.

use std::io;
use std::time::Instant;

use serde::Serialize;

use tether_callback::CallbackSet;
use tether_core::{Pid, SyncConfig, WakeTime, WorkerCommand};

use crate::event::FsEvent;

/// Starts worker processes on behalf of a unit.
///
/// A successful return means the worker is running and has been counted
/// against the global process budget.
pub trait Spawner {
    fn spawn(&mut self, command: &WorkerCommand) -> io::Result<Pid>;
}

/// One configured watch root, as seen by the scheduler.
pub trait SyncUnit: Send {
    fn config(&self) -> &SyncConfig;

    /// Start workers for due actions. Returns whether anything was started.
    fn invoke_actions(&mut self, now: Instant, spawner: &mut dyn Spawner) -> bool;

    /// Claim a finished worker if it belongs to this unit.
    fn collect(&mut self, pid: Pid, exit_code: i32) -> bool;

    /// Earliest time this unit next needs a cycle.
    fn alarm(&self) -> WakeTime;

    fn install_callbacks(&mut self, callbacks: CallbackSet);

    /// Queue the one-time startup action.
    fn queue_init(&mut self);

    fn push_event(&mut self, event: FsEvent, now: Instant);

    fn report(&self) -> SyncReport;
}

/// Snapshot of a unit for the status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub name: String,
    pub source: String,
    pub target: String,
    pub waiting: usize,
    pub active: usize,
    pub delays: Vec<DelayReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelayReport {
    pub event: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}
