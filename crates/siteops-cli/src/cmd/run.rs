use crate::root::load_config;
use anyhow::{anyhow, Context};
use siteops_core::config::WarnLevel;
use siteops_core::Daemon;
use std::path::Path;

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let errors: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message)
        .collect();
    if !errors.is_empty() {
        return Err(anyhow!(
            "config has errors; run `siteops config validate`:\n  {}",
            errors.join("\n  ")
        ));
    }

    let daemon = Daemon::open(config, config_path).context("failed to start daemon")?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        println!("siteops running (config {}). Ctrl-C to stop.", config_path.display());
        daemon
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for Ctrl-C");
                }
            })
            .await
            .context("daemon failed")
    })
}
