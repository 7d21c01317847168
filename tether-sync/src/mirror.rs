//! The mirroring sync unit.

use std::path::Path;
use std::time::{Duration, Instant};

use tether_callback::{CallbackSet, EventContext};
use tether_core::{Pid, SyncConfig, WakeTime};

use crate::delay::{Delay, DelayQueue, DelayStatus};
use crate::event::FsEvent;
use crate::unit::{DelayReport, Spawner, SyncReport, SyncUnit};

/// Minimum wait before retrying an action whose worker failed to spawn.
const SPAWN_BACKOFF: Duration = Duration::from_secs(5);

/// Mirrors one source directory to its target by running callbacks for
/// coalesced events.
#[derive(Debug)]
pub struct Mirror {
    config: SyncConfig,
    callbacks: CallbackSet,
    queue: DelayQueue,
}

impl Mirror {
    pub fn new(config: SyncConfig) -> Self {
        let queue = DelayQueue::new(config.delay(), config.max_delays);
        Self {
            config,
            callbacks: CallbackSet::default(),
            queue,
        }
    }

    pub fn queue(&self) -> &DelayQueue {
        &self.queue
    }

    fn context(&self, delay: &Delay) -> EventContext {
        let path = (!delay.path.as_os_str().is_empty()).then_some(delay.path.as_path());
        EventContext::new(&self.config, delay.kind, path, delay.path2.as_deref())
    }
}

fn describe(delay: &Delay) -> String {
    match &delay.path2 {
        Some(to) => format!("{} {} -> {}", delay.kind, delay.path.display(), to.display()),
        None if delay.path == Path::new("") => delay.kind.to_string(),
        None => format!("{} {}", delay.kind, delay.path.display()),
    }
}

impl SyncUnit for Mirror {
    fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn invoke_actions(&mut self, now: Instant, spawner: &mut dyn Spawner) -> bool {
        let name = &self.config.name;
        let mut started = false;
        while self.queue.active_count() < self.config.max_processes {
            let Some(delay) = self
                .queue
                .next_ready(now)
                .and_then(|id| self.queue.get(id))
                .cloned()
            else {
                break;
            };
            let ctx = self.context(&delay);
            match self.callbacks.render(delay.kind, &ctx) {
                Ok(Some(command)) => match spawner.spawn(&command) {
                    Ok(pid) => {
                        tracing::info!("{name}: {} started as pid {pid}", describe(&delay));
                        self.queue.activate(delay.id, pid);
                        started = true;
                    }
                    Err(err) => {
                        tracing::error!("{name}: cannot start {}: {err}", describe(&delay));
                        let backoff = self.config.delay().max(SPAWN_BACKOFF);
                        self.queue.postpone(delay.id, now + backoff);
                        break;
                    }
                },
                Ok(None) => {
                    tracing::debug!("{name}: nothing to run for {}", describe(&delay));
                    self.queue.remove(delay.id);
                }
                Err(err) => {
                    tracing::error!("{name}: dropping {}: {err}", describe(&delay));
                    self.queue.remove(delay.id);
                }
            }
        }
        started
    }

    fn collect(&mut self, pid: Pid, exit_code: i32) -> bool {
        let retry = exit_code != 0 && self.config.retry_exit_codes.contains(&exit_code);
        let Some(delay) = self.queue.settle(pid, retry) else {
            return false;
        };
        let name = &self.config.name;
        if exit_code == 0 {
            tracing::debug!("{name}: {} finished", describe(&delay));
        } else if retry {
            tracing::warn!(
                "{name}: {} exited with {exit_code}, retrying",
                describe(&delay)
            );
        } else {
            tracing::error!(
                "{name}: {} failed with exit code {exit_code}",
                describe(&delay)
            );
        }
        true
    }

    fn alarm(&self) -> WakeTime {
        if self.queue.active_count() >= self.config.max_processes {
            WakeTime::Never
        } else {
            self.queue.alarm()
        }
    }

    fn install_callbacks(&mut self, callbacks: CallbackSet) {
        self.callbacks = callbacks;
    }

    fn queue_init(&mut self) {
        self.queue.push_init();
    }

    fn push_event(&mut self, event: FsEvent, now: Instant) {
        self.queue.push(event, now);
    }

    fn report(&self) -> SyncReport {
        let delays = self
            .queue
            .iter()
            .map(|d| DelayReport {
                event: d.kind.to_string(),
                path: d.path.display().to_string(),
                path2: d.path2.as_ref().map(|p| p.display().to_string()),
                pid: match d.status {
                    DelayStatus::Active(pid) => Some(pid.0),
                    DelayStatus::Waiting => None,
                },
            })
            .collect();
        SyncReport {
            name: self.config.name.to_string(),
            source: self.config.source.display().to_string(),
            target: self.config.target.clone(),
            waiting: self.queue.waiting_count(),
            active: self.queue.active_count(),
            delays,
        }
    }
}
