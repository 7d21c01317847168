use std::time::{Duration, Instant};

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;

use tether_callback::Translator;
use tether_core::{Config, WakeTime, WorkerCommand};
use tether_sync::Mirror;

use crate::error::{io_err, DaemonError};
use crate::launcher::{ProcessExit, TokioLauncher};
use crate::logging::LogHandle;
use crate::monitor::{MonitorMessage, NotifyMonitor};
use crate::scheduler::{Scheduler, Startup, StartupContext, StartupHook, WAITING_REPORT_INTERVAL};

const LOG_ROTATION_INTERVAL: Duration = Duration::from_secs(5);

/// Why the driver loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// SIGINT or SIGTERM.
    Shutdown,
    /// Faded out and every worker finished.
    Drained,
    /// SIGHUP: every worker finished; reload the configuration and
    /// initialize again.
    Reload,
}

/// Run the daemon on a current-thread runtime until it exits.
pub fn start_blocking(
    config: Config,
    logging: &LogHandle,
    first_time: bool,
) -> Result<Exit, DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config, logging.clone(), first_time))
}

/// Build the scheduler for `config`, initialize it and drive it.
pub async fn run(config: Config, logging: LogHandle, first_time: bool) -> Result<Exit, DaemonError> {
    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<ProcessExit>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<MonitorMessage>();

    let hook = config.settings().startup.clone().map(shell_hook);
    let units: Vec<Mirror> = config.syncs().iter().cloned().map(Mirror::new).collect();

    let mut scheduler = Scheduler::new(config, Box::new(TokioLauncher::new(exit_tx)));
    for unit in units {
        scheduler.register(Box::new(unit))?;
    }

    let translator = Translator::new();
    let mut monitor = NotifyMonitor::new(event_tx);
    scheduler.initialize(
        first_time,
        Startup {
            hook,
            translator: &translator,
            monitor: &mut monitor,
            logging: Some(&logging),
        },
    )?;

    let rotation = logging.clone();
    scheduler
        .user_alarms_mut()
        .schedule(Instant::now() + LOG_ROTATION_INTERVAL, move |now| {
            rotation.rotate();
            Some(now + LOG_ROTATION_INTERVAL)
        });

    tracing::info!(
        syncs = scheduler.registry().len(),
        budget = ?scheduler.processes().budget(),
        "daemon running"
    );
    drive(&mut scheduler, &monitor, &mut exit_rx, &mut event_rx).await
}

fn shell_hook(command: String) -> StartupHook {
    Box::new(move |ctx: &mut StartupContext<'_>| {
        tracing::info!(command = %command, "running startup hook");
        ctx.spawn(&WorkerCommand::shell(command))?;
        Ok(())
    })
}

async fn drive(
    scheduler: &mut Scheduler,
    monitor: &NotifyMonitor,
    exits: &mut mpsc::UnboundedReceiver<ProcessExit>,
    events: &mut mpsc::UnboundedReceiver<MonitorMessage>,
) -> Result<Exit, DaemonError> {
    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    let mut hangup = signal(SignalKind::hangup()).map_err(|e| io_err("SIGHUP handler", e))?;

    loop {
        if !scheduler.cycle(Instant::now())? {
            tracing::info!("all workers finished, exiting");
            return Ok(Exit::Drained);
        }

        monitor.release_renames(Instant::now());
        let wake = scheduler.alarm().earliest(monitor.alarm());
        let sleep = async move {
            match wake {
                WakeTime::Immediate => {}
                WakeTime::At(at) => tokio::time::sleep_until(at.into()).await,
                WakeTime::Never => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            exit = exits.recv() => {
                let exit = exit.ok_or(DaemonError::ChannelClosed("process exits"))?;
                scheduler.process_exited(exit.pid, exit.code)?;
            }
            message = events.recv() => {
                match message.ok_or(DaemonError::ChannelClosed("monitor events"))? {
                    MonitorMessage::Event { unit, event } => {
                        scheduler.deliver(unit, event, Instant::now());
                    }
                    MonitorMessage::Overflow { unit } => {
                        tracing::warn!(unit, "monitor queue overflowed");
                        scheduler.overflow();
                    }
                }
            }
            _ = sleep => {}
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| io_err("ctrl-c handler", e))?;
                tracing::info!("received ctrl-c, shutting down");
                return Ok(Exit::Shutdown);
            }
            _ = terminate.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                return Ok(Exit::Shutdown);
            }
            _ = hangup.recv() => {
                tracing::info!("received SIGHUP, reloading");
                return drain_for_reload(scheduler, exits, &mut terminate).await;
            }
        }
    }
}

/// Stop dispatching and wait until no worker is running, so the next
/// scheduler starts from an accurate process count.
///
/// Monitor events are not read meanwhile; the init action of the reloaded
/// configuration covers what they described.
async fn drain_for_reload(
    scheduler: &mut Scheduler,
    exits: &mut mpsc::UnboundedReceiver<ProcessExit>,
    terminate: &mut Signal,
) -> Result<Exit, DaemonError> {
    let mut last_report: Option<Instant> = None;
    loop {
        let running = scheduler.processes().running();
        if running == 0 {
            return Ok(Exit::Reload);
        }
        let now = Instant::now();
        if last_report.map_or(true, |last| now.duration_since(last) >= WAITING_REPORT_INTERVAL) {
            tracing::info!(running, "waiting for {running} processes before reload");
            last_report = Some(now);
        }

        tokio::select! {
            exit = exits.recv() => {
                let exit = exit.ok_or(DaemonError::ChannelClosed("process exits"))?;
                scheduler.process_exited(exit.pid, exit.code)?;
            }
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| io_err("ctrl-c handler", e))?;
                tracing::info!("received ctrl-c, shutting down");
                return Ok(Exit::Shutdown);
            }
            _ = terminate.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                return Ok(Exit::Shutdown);
            }
        }
    }
}
