//! Foreground daemon: run until shutdown, re-initializing on SIGHUP.

use anyhow::{Context, Result};

use tether_daemon::{init_tracing, start_blocking, Exit};

use crate::Cli;

pub fn run(cli: &Cli) -> Result<()> {
    let logging = init_tracing(cli.log_json);
    let mut first_time = true;
    loop {
        let config = match cli.load_config() {
            Ok(config) => config,
            Err(err) => {
                tracing::error!("{err:#}");
                return Err(err);
            }
        };
        match start_blocking(config, &logging, first_time) {
            Ok(Exit::Reload) => {
                tracing::info!("reloading configuration");
                first_time = false;
            }
            Ok(Exit::Shutdown) | Ok(Exit::Drained) => return Ok(()),
            Err(err) => {
                tracing::error!(error = %err, "daemon failed");
                return Err(err).context("daemon exited with error");
            }
        }
    }
}
