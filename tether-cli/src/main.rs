//! Tether: mirror directory trees by running callbacks on filesystem events.
//!
//! # Usage
//!
//! ```text
//! tether [--config PATH] [--max-processes N] [--status-file PATH]
//!        [--status-interval SECS] [--log-file PATH] [--log-level LEVEL]
//!        [--log-json] [--check]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser};

use tether_core::{paths, Config, ConfigBuilder, Settings};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tether",
    version,
    about = "Mirror directory trees by running callbacks on filesystem events",
    long_about = None,
)]
struct Cli {
    /// Configuration file [default: <config dir>/tether/tether.yaml].
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(flatten)]
    settings: SettingsArgs,

    /// Emit log lines as JSON.
    #[arg(long)]
    log_json: bool,

    /// Validate the configuration and callbacks, then exit.
    #[arg(long)]
    check: bool,
}

/// Settings that override the configuration file.
#[derive(Args, Debug, Clone, Default)]
struct SettingsArgs {
    /// Global ceiling on concurrently running workers.
    #[arg(long, value_name = "N")]
    max_processes: Option<usize>,

    /// Write a JSON status snapshot to this file.
    #[arg(long, value_name = "PATH")]
    status_file: Option<PathBuf>,

    /// Minimum seconds between status file writes.
    #[arg(long, value_name = "SECS")]
    status_interval: Option<u64>,

    /// Log to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log filter, e.g. `info` or `tether_daemon=debug`.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl From<SettingsArgs> for Settings {
    fn from(args: SettingsArgs) -> Self {
        Settings {
            max_processes: args.max_processes,
            status_file: args.status_file,
            status_interval: args.status_interval,
            log_file: args.log_file,
            log_level: args.log_level,
            startup: None,
        }
    }
}

impl Cli {
    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => paths::default_config_path().context("could not locate the configuration"),
        }
    }

    /// Load the file, layer the command line on top and freeze the result.
    fn load_config(&self) -> Result<Config> {
        let path = self.config_path()?;
        let config = ConfigBuilder::load_at(&path)
            .with_context(|| format!("failed to load {}", path.display()))?
            .overrides(self.settings.clone().into())
            .build()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.check {
        commands::check::run(&cli)
    } else {
        commands::run::run(&cli)
    }
}
