use crate::output::{or_dash, print_json, print_table, when};
use crate::root::open_store;
use anyhow::Context;
use clap::Subcommand;
use siteops_core::entity::NewServer;
use siteops_core::store::Store;
use std::path::Path;

#[derive(Subcommand)]
pub enum ServerSubcommand {
    /// Register a hosting server
    Add {
        name: String,
        /// Base URL the health probe is sent to
        base_url: String,
        #[arg(long, default_value = "default")]
        pool: String,
        /// Mark as the pool's primary (at most one per pool)
        #[arg(long)]
        primary: bool,
    },
    /// List servers and their last health check
    List,
}

pub fn run(config_path: &Path, subcmd: ServerSubcommand, json: bool) -> anyhow::Result<()> {
    let store = open_store(config_path)?;
    match subcmd {
        ServerSubcommand::Add {
            name,
            base_url,
            pool,
            primary,
        } => add(
            &store,
            NewServer {
                name,
                base_url,
                pool,
                is_primary: primary,
            },
            json,
        ),
        ServerSubcommand::List => list(&store, json),
    }
}

fn add(store: &dyn Store, new: NewServer, json: bool) -> anyhow::Result<()> {
    let name = new.name.clone();
    let server = store
        .insert_server(new)
        .with_context(|| format!("failed to add server '{name}'"))?;
    if json {
        print_json(&server)?;
    } else {
        println!(
            "Added server #{} '{}' in pool '{}'.",
            server.id, server.name, server.pool
        );
    }
    Ok(())
}

fn list(store: &dyn Store, json: bool) -> anyhow::Result<()> {
    let servers = store.list_servers().context("failed to list servers")?;

    if json {
        return print_json(&servers);
    }
    if servers.is_empty() {
        println!("No servers.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = servers
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.name.clone(),
                s.pool.clone(),
                if s.is_primary { "yes" } else { "" }.to_string(),
                if s.is_active { "yes" } else { "no" }.to_string(),
                s.health_status.to_string(),
                or_dash(s.last_latency_ms.map(|ms| format!("{ms}ms"))),
                when(s.last_health_check_at),
            ]
        })
        .collect();
    print_table(
        &["ID", "NAME", "POOL", "PRIMARY", "ACTIVE", "HEALTH", "LATENCY", "CHECKED"],
        rows,
    );
    Ok(())
}
