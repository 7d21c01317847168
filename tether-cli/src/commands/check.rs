//! `tether --check`: validate configuration and callbacks without starting.

use anyhow::{Context, Result};
use serde_json::json;

use tether_callback::Translator;
use tether_daemon::DaemonError;

use crate::Cli;

pub fn run(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    if config.syncs().is_empty() {
        return Err(DaemonError::NothingToWatch.into());
    }

    let translator = Translator::new();
    let mut syncs = Vec::with_capacity(config.syncs().len());
    for sync in config.syncs() {
        let callbacks = translator
            .translate(&sync.name, &sync.callbacks)
            .with_context(|| format!("sync '{}' has an invalid callback", sync.name))?;
        syncs.push(json!({
            "name": sync.name.to_string(),
            "source": sync.source.display().to_string(),
            "target": sync.target,
            "monitor": sync.monitor.to_string(),
            "callbacks": callbacks.len(),
        }));
    }

    let report = json!({
        "config": config.origin().map(|p| p.display().to_string()),
        "settings": config.settings(),
        "syncs": syncs,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render check report")?
    );
    Ok(())
}
