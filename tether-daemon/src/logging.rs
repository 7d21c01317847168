//! Log sink and level control.
//!
//! Logging starts in bootstrap mode on stderr. Applying the resolved settings
//! switches the sink to the configured log file and reloads the level filter.
//! Log files rotate by size: `tether.log` moves to `tether.log.1`, older backups shift
//! up, and at most five are kept.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use tether_core::ResolvedSettings;

use crate::error::{io_err, DaemonError};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

enum SinkTarget {
    Bootstrap,
    File { path: PathBuf, file: File },
}

/// Shared, switchable destination for formatted log lines.
#[derive(Clone)]
pub struct LogSink {
    target: Arc<Mutex<SinkTarget>>,
}

impl LogSink {
    pub fn bootstrap() -> Self {
        Self {
            target: Arc::new(Mutex::new(SinkTarget::Bootstrap)),
        }
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, SinkTarget>> {
        self.target
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink lock poisoned"))
    }

    /// Current log file, if logging left bootstrap mode.
    pub fn file_path(&self) -> Option<PathBuf> {
        match &*self.lock().ok()? {
            SinkTarget::File { path, .. } => Some(path.clone()),
            SinkTarget::Bootstrap => None,
        }
    }

    /// Append to `path` from now on.
    pub fn open_file(&self, path: &Path) -> io::Result<()> {
        let file = open_append(path)?;
        *self.lock()? = SinkTarget::File {
            path: path.to_path_buf(),
            file,
        };
        Ok(())
    }

    /// Rotate once the live file reached `max_bytes`.
    ///
    /// Backups shift up by one (`.1` becomes `.2` and so on), the highest is
    /// overwritten, the live file becomes `.1` and a new file is opened.
    pub fn rotate(&self, max_bytes: u64, max_files: usize) -> io::Result<bool> {
        let mut target = self.lock()?;
        let SinkTarget::File { path, file } = &mut *target else {
            return Ok(false);
        };
        if file.metadata()?.len() < max_bytes {
            return Ok(false);
        }
        file.flush()?;

        let backups: Vec<PathBuf> = (1..=max_files).map(|n| backup_path(path, n)).collect();
        for pair in backups.windows(2).rev() {
            match fs::rename(&pair[0], &pair[1]) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
                _ => {}
            }
        }
        match backups.first() {
            Some(first) => fs::rename(&*path, first)?,
            None => fs::remove_file(&*path)?,
        }
        *file = open_append(path)?;
        Ok(true)
    }
}

/// `tether.log` with `n` gives `tether.log.n`.
fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub struct SinkWriter {
    target: Arc<Mutex<SinkTarget>>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut target = self
            .target
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink lock poisoned"))?;
        match &mut *target {
            SinkTarget::Bootstrap => io::stderr().write(buf),
            SinkTarget::File { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut target = self
            .target
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink lock poisoned"))?;
        match &mut *target {
            SinkTarget::Bootstrap => io::stderr().flush(),
            SinkTarget::File { file, .. } => file.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            target: self.target.clone(),
        }
    }
}

/// Handle for adjusting logging after the subscriber is installed.
#[derive(Clone)]
pub struct LogHandle {
    sink: LogSink,
    filter: Option<reload::Handle<EnvFilter, Registry>>,
}

impl LogHandle {
    /// A handle not attached to any subscriber; only the sink is live.
    pub fn detached(sink: LogSink) -> Self {
        Self { sink, filter: None }
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Apply the log level and log file from `settings`.
    pub fn apply(&self, settings: &ResolvedSettings) -> Result<(), DaemonError> {
        if let Some(level) = &settings.log_level {
            let filter = EnvFilter::try_new(level)
                .map_err(|e| DaemonError::Logging(format!("invalid log level '{level}': {e}")))?;
            if let Some(handle) = &self.filter {
                handle
                    .reload(filter)
                    .map_err(|e| DaemonError::Logging(e.to_string()))?;
            }
        }
        if let Some(path) = &settings.log_file {
            self.sink.open_file(path).map_err(|e| io_err(path, e))?;
            tracing::info!(path = %path.display(), "logging to file");
        }
        Ok(())
    }

    /// Rotate the log file if it is too large. Failures are logged.
    pub fn rotate(&self) {
        match self.sink.rotate(MAX_LOG_BYTES, MAX_ROTATED_FILES) {
            Ok(true) => tracing::info!("log file rotated"),
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "log rotation failed"),
        }
    }
}

/// Install the global subscriber in bootstrap mode.
///
/// The level comes from `RUST_LOG` (default `info`) until settings are
/// applied. A second call leaves the first subscriber in place.
pub fn init_tracing(json: bool) -> LogHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    let sink = LogSink::bootstrap();
    let layer = fmt::layer().with_writer(sink.clone()).with_target(false);
    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    LogHandle {
        sink,
        filter: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tempfile::TempDir;

    fn settings(log_file: Option<PathBuf>, log_level: Option<&str>) -> ResolvedSettings {
        ResolvedSettings {
            max_processes: None,
            status_file: None,
            status_interval: Duration::from_secs(10),
            log_file,
            log_level: log_level.map(str::to_string),
            startup: None,
        }
    }

    #[test]
    fn apply_switches_sink_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/tether.log");
        let handle = LogHandle::detached(LogSink::bootstrap());
        handle.apply(&settings(Some(path.clone()), None)).unwrap();
        assert_eq!(handle.sink().file_path(), Some(path.clone()));

        let mut writer = handle.sink().make_writer();
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn invalid_level_is_rejected() {
        let handle = LogHandle::detached(LogSink::bootstrap());
        let err = handle
            .apply(&settings(None, Some("tether=loud")))
            .unwrap_err();
        assert!(matches!(err, DaemonError::Logging(_)));
    }

    #[test]
    fn bootstrap_sink_does_not_rotate() {
        let sink = LogSink::bootstrap();
        assert!(!sink.rotate(0, MAX_ROTATED_FILES).unwrap());
    }

    #[test]
    fn sink_rotates_and_keeps_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tether.log");
        let sink = LogSink::bootstrap();
        sink.open_file(&path).unwrap();
        let mut writer = sink.make_writer();
        writer.write_all(b"before\n").unwrap();

        assert!(sink.rotate(1, MAX_ROTATED_FILES).unwrap());
        writer.write_all(b"after\n").unwrap();

        assert_eq!(fs::read_to_string(backup_path(&path, 1)).unwrap(), "before\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "after\n");
    }

    #[test]
    fn small_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        let sink = LogSink::bootstrap();
        sink.open_file(&log).unwrap();
        sink.make_writer().write_all(b"small").unwrap();

        assert!(!sink.rotate(MAX_LOG_BYTES, MAX_ROTATED_FILES).unwrap());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn rotated_backups_are_capped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        for n in 1..=MAX_ROTATED_FILES {
            fs::write(backup_path(&log, n), format!("rotated-{n}")).unwrap();
        }
        let sink = LogSink::bootstrap();
        sink.open_file(&log).unwrap();
        sink.make_writer().write_all(b"live").unwrap();

        assert!(sink.rotate(1, MAX_ROTATED_FILES).unwrap());
        assert_eq!(fs::read_to_string(backup_path(&log, 1)).unwrap(), "live");
        assert_eq!(fs::read_to_string(backup_path(&log, 2)).unwrap(), "rotated-1");
        assert_eq!(
            fs::read_to_string(backup_path(&log, MAX_ROTATED_FILES)).unwrap(),
            format!("rotated-{}", MAX_ROTATED_FILES - 1)
        );
        assert!(!backup_path(&log, MAX_ROTATED_FILES + 1).exists());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
    }

    #[test]
    fn rotation_without_backups_truncates() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        let sink = LogSink::bootstrap();
        sink.open_file(&log).unwrap();
        sink.make_writer().write_all(b"gone").unwrap();

        assert!(sink.rotate(1, 0).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert!(!backup_path(&log, 1).exists());
    }
}
