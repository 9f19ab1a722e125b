use crate::output::{or_dash, print_json, print_table, when};
use crate::root::load_config;
use anyhow::Context;
use siteops_core::orchestrator::RunLedger;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let db = siteops_core::db::open(&config.database_path(config_path))
        .context("failed to open database")?;
    let ledger = RunLedger::new(db);
    let entries = ledger.list().context("failed to read run ledger")?;

    // Configured triggers first, then ledger entries left over from removed ones.
    let mut rows = Vec::new();
    let mut items = Vec::new();
    for t in &config.triggers {
        let entry = entries.iter().find(|e| e.trigger == t.name);
        items.push(serde_json::json!({
            "name": t.name,
            "interval_secs": t.interval_secs,
            "action": t.action,
            "ledger": entry,
        }));
        rows.push(vec![
            t.name.clone(),
            format!("{}s", t.interval_secs),
            entry.map_or("idle", |e| if e.running { "running" } else { "idle" }).to_string(),
            entry.map_or(0, |e| e.runs).to_string(),
            when(entry.and_then(|e| e.started_at)),
            when(entry.and_then(|e| e.finished_at)),
            or_dash(entry.and_then(|e| e.last_error.clone())),
        ]);
    }
    for e in entries.iter().filter(|e| config.trigger(&e.trigger).is_none()) {
        items.push(serde_json::json!({
            "name": e.trigger,
            "interval_secs": null,
            "action": null,
            "ledger": e,
        }));
        rows.push(vec![
            e.trigger.clone(),
            "(removed)".to_string(),
            if e.running { "running" } else { "idle" }.to_string(),
            e.runs.to_string(),
            when(e.started_at),
            when(e.finished_at),
            or_dash(e.last_error.clone()),
        ]);
    }

    if json {
        return print_json(&items);
    }
    if rows.is_empty() {
        println!("No triggers configured.");
        return Ok(());
    }
    print_table(
        &["TRIGGER", "INTERVAL", "STATE", "RUNS", "STARTED", "FINISHED", "LAST ERROR"],
        rows,
    );
    Ok(())
}
