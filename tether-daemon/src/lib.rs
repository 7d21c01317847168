//! # tether-daemon
//!
//! The scheduling core of the mirroring daemon and the event loop that
//! drives it.
//!
//! [`Scheduler`] owns the lifecycle status, global process accounting and the
//! registered sync units. The driver in [`run`] feeds it monitor events and
//! worker exits, calls [`Scheduler::cycle`] and sleeps until
//! [`Scheduler::alarm`].

pub mod alarms;
mod error;
pub mod launcher;
pub mod logging;
pub mod monitor;
mod runtime;
pub mod scheduler;
pub mod status;

pub use alarms::UserAlarms;
pub use error::DaemonError;
pub use launcher::{ProcessExit, TokioLauncher};
pub use logging::{init_tracing, LogHandle, LogSink};
pub use monitor::{EventTranslator, MonitorBackend, MonitorMessage, NotifyMonitor, RENAME_GRACE};
pub use runtime::{run, start_blocking, Exit};
pub use scheduler::{
    DaemonStatus, Launcher, ProcessAccounting, Scheduler, Startup, StartupContext, StartupHook,
    SyncRegistry,
};
pub use status::{StatusFile, StatusReport};
