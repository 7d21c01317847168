use std::time::Instant;

use super::{DaemonStatus, Scheduler, WAITING_REPORT_INTERVAL};
use crate::error::DaemonError;
use crate::status::StatusReport;

impl Scheduler {
    /// One pass of the scheduler. Returns `Ok(false)` once a faded daemon
    /// has no workers left, `Ok(true)` otherwise.
    pub fn cycle(&mut self, now: Instant) -> Result<bool, DaemonError> {
        match self.status {
            DaemonStatus::Fade => return Ok(self.fade_cycle(now)),
            DaemonStatus::Init => {
                return Err(DaemonError::Consistency(
                    "cycle called before initialization".to_string(),
                ))
            }
            DaemonStatus::Run => {}
        }

        // The budget gates whole rounds only; a round that starts below it
        // visits every unit.
        if self.processes.has_capacity() {
            let processes = &mut self.processes;
            self.registry.round_robin(|unit| {
                if unit.invoke_actions(now, &mut *processes) {
                    tracing::trace!(sync = %unit.config().name, "actions started");
                }
            });
        }

        self.alarms.invoke(now);
        self.write_status(now);
        Ok(true)
    }

    fn fade_cycle(&mut self, now: Instant) -> bool {
        let running = self.processes.running();
        if running == 0 {
            return false;
        }
        let report = self
            .last_reported_waiting
            .map_or(true, |last| now.saturating_duration_since(last) >= WAITING_REPORT_INTERVAL);
        if report {
            tracing::info!(running, "waiting for {running} processes");
            self.last_reported_waiting = Some(now);
        }
        true
    }

    fn write_status(&mut self, now: Instant) {
        let Some(status_file) = self.status_file.as_mut() else {
            return;
        };
        let report = || {
            StatusReport::new(
                self.status,
                self.processes.running(),
                self.processes.budget(),
                self.registry.iter().map(|unit| unit.report()).collect(),
            )
        };
        if let Err(err) = status_file.write(now, report) {
            tracing::warn!(
                path = %status_file.path().display(),
                error = %err,
                "status file write failed"
            );
        }
    }
}
