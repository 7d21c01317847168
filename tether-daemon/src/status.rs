//! Status file: a JSON snapshot of the scheduler, rewritten at most once per
//! interval.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use tether_core::WakeTime;
use tether_sync::SyncReport;

use crate::error::{io_err, DaemonError};
use crate::scheduler::DaemonStatus;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub written_at: DateTime<Utc>,
    pub status: DaemonStatus,
    pub running: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<usize>,
    pub syncs: Vec<SyncReport>,
}

impl StatusReport {
    pub fn new(
        status: DaemonStatus,
        running: usize,
        budget: Option<usize>,
        syncs: Vec<SyncReport>,
    ) -> Self {
        Self {
            written_at: Utc::now(),
            status,
            running,
            budget,
            syncs,
        }
    }
}

/// Rate-limited status file writer.
#[derive(Debug)]
pub struct StatusFile {
    path: PathBuf,
    interval: Duration,
    last_written: Option<Instant>,
    /// Set when a write was requested inside the interval.
    pending: Option<Instant>,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_written: None,
            pending: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a fresh report unless the last write is younger than the
    /// interval, in which case the write is deferred to the alarm.
    ///
    /// Returns whether the file was written.
    pub fn write(
        &mut self,
        now: Instant,
        report: impl FnOnce() -> StatusReport,
    ) -> Result<bool, DaemonError> {
        if let Some(last) = self.last_written {
            let due = last + self.interval;
            if now < due {
                self.pending = Some(due);
                return Ok(false);
            }
        }
        let json = serde_json::to_string_pretty(&report())?;
        atomic_write(&self.path, &json)?;
        self.last_written = Some(now);
        self.pending = None;
        tracing::debug!(path = %self.path.display(), "status file written");
        Ok(true)
    }

    pub fn alarm(&self) -> WakeTime {
        self.pending.into()
    }
}

fn atomic_write(path: &Path, content: &str) -> Result<(), DaemonError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("status");
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
