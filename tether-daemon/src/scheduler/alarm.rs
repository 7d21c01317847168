use tether_core::WakeTime;

use super::{DaemonStatus, Scheduler};
use crate::status::StatusFile;

impl Scheduler {
    /// Earliest time the driver must wake for the next cycle.
    ///
    /// Computed fresh on every call. Units are not polled while the budget is
    /// exhausted; the status file and user alarms always are.
    pub fn alarm(&self) -> WakeTime {
        if self.status != DaemonStatus::Run {
            return WakeTime::Never;
        }
        let units = if self.processes.has_capacity() {
            WakeTime::earliest_of(self.registry.iter().map(|unit| unit.alarm()))
        } else {
            WakeTime::Never
        };
        let status = self
            .status_file
            .as_ref()
            .map_or(WakeTime::Never, StatusFile::alarm);
        WakeTime::earliest_of([units, status, self.alarms.alarm()])
    }
}
