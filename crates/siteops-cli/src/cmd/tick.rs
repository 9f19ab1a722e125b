use crate::output::{or_dash, print_json};
use crate::root::load_config;
use anyhow::Context;
use siteops_core::Daemon;
use std::path::Path;

pub fn run(config_path: &Path, trigger: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let daemon = Daemon::open(config, config_path).context("failed to open daemon state")?;

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt
        .block_on(daemon.run_trigger(trigger))
        .with_context(|| format!("failed to run trigger '{trigger}'"))?;

    let Some(outcome) = outcome else {
        if json {
            print_json(&serde_json::json!({ "trigger": trigger, "skipped": true }))?;
        } else {
            println!("Trigger '{trigger}' is already running; skipped.");
        }
        return Ok(());
    };

    if json {
        print_json(&outcome)?;
    } else {
        let elapsed = outcome.finished_at - outcome.started_at;
        println!(
            "Trigger '{}' finished in {}ms (run {}).",
            outcome.trigger,
            elapsed.num_milliseconds(),
            outcome.run_id
        );
        if let Some(r) = &outcome.report {
            println!(
                "  candidates {}  planned {}  skipped {}  succeeded {}  failed {}  unfinished {}",
                r.candidates, r.planned, r.skipped, r.succeeded, r.failed, r.unfinished
            );
        }
        if outcome.error.is_some() {
            println!("  error: {}", or_dash(outcome.error.as_deref()));
        }
    }

    if let Some(e) = outcome.error {
        anyhow::bail!("trigger '{trigger}' failed: {e}");
    }
    Ok(())
}
