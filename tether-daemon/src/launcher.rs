//! Worker processes on `tokio::process`.

use std::io;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc;

use tether_core::{Pid, WorkerCommand};

use crate::scheduler::Launcher;

/// Exit notification for one worker. Children killed by a signal report -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub pid: Pid,
    pub code: i32,
}

/// Spawns workers and reports each exit on a channel.
///
/// Must be used from inside a tokio runtime.
pub struct TokioLauncher {
    exits: mpsc::UnboundedSender<ProcessExit>,
}

impl TokioLauncher {
    pub fn new(exits: mpsc::UnboundedSender<ProcessExit>) -> Self {
        Self { exits }
    }
}

impl Launcher for TokioLauncher {
    fn launch(&mut self, command: &WorkerCommand) -> io::Result<Pid> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).stdin(Stdio::null());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .map(Pid)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "worker has no pid"))?;

        let exits = self.exits.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(err) => {
                    tracing::error!(pid = %pid, error = %err, "waiting for worker failed");
                    -1
                }
            };
            let _ = exits.send(ProcessExit { pid, code });
        });
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn reports_exit_codes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut launcher = TokioLauncher::new(tx);

        let ok = launcher.launch(&WorkerCommand::shell("exit 0")).expect("spawn");
        let exit = rx.recv().await.expect("exit");
        assert_eq!(exit, ProcessExit { pid: ok, code: 0 });

        let failed = launcher.launch(&WorkerCommand::shell("exit 7")).expect("spawn");
        let exit = rx.recv().await.expect("exit");
        assert_eq!(exit, ProcessExit { pid: failed, code: 7 });
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_program_is_a_spawn_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut launcher = TokioLauncher::new(tx);
        let command = WorkerCommand {
            program: "/nonexistent/worker".into(),
            args: Vec::new(),
            cwd: None,
        };
        assert!(launcher.launch(&command).is_err());
    }
}
