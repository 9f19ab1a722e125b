use crate::output::{or_dash, print_json, print_table, when};
use crate::root::open_store;
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use siteops_core::entity::Domain;
use siteops_core::store::Store;
use std::path::Path;

#[derive(Subcommand)]
pub enum DomainSubcommand {
    /// Register a domain; it starts out unchecked
    Add {
        hostname: String,
        /// Site the domain serves
        #[arg(long)]
        site: Option<u64>,
    },
    /// List domains and their DNS/SSL status
    List,
    /// Force a fresh nameserver check from any status
    Recheck { id: u64 },
}

pub fn run(config_path: &Path, subcmd: DomainSubcommand, json: bool) -> anyhow::Result<()> {
    let store = open_store(config_path)?;
    match subcmd {
        DomainSubcommand::Add { hostname, site } => add(&store, &hostname, site, json),
        DomainSubcommand::List => list(&store, json),
        DomainSubcommand::Recheck { id } => recheck(&store, id, json),
    }
}

fn add(store: &dyn Store, hostname: &str, site: Option<u64>, json: bool) -> anyhow::Result<()> {
    let domain = store
        .insert_domain(&hostname.to_ascii_lowercase(), site)
        .with_context(|| format!("failed to add domain '{hostname}'"))?;
    if json {
        print_json(&domain)?;
    } else {
        println!("Added domain #{} {} ({}).", domain.id, domain.hostname, domain.status);
    }
    Ok(())
}

fn list(store: &dyn Store, json: bool) -> anyhow::Result<()> {
    let domains = store.list_domains().context("failed to list domains")?;

    if json {
        return print_json(&domains);
    }
    if domains.is_empty() {
        println!("No domains.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = domains
        .iter()
        .map(|d| {
            vec![
                d.id.to_string(),
                d.hostname.clone(),
                d.status.to_string(),
                when(Some(d.status_since)),
                when(d.last_checked_at),
                when(d.ssl_expires_at),
                or_dash(d.last_error.clone()),
            ]
        })
        .collect();
    print_table(
        &["ID", "HOSTNAME", "STATUS", "SINCE", "CHECKED", "SSL EXPIRES", "LAST ERROR"],
        rows,
    );
    Ok(())
}

fn recheck(store: &dyn Store, id: u64, json: bool) -> anyhow::Result<()> {
    let now = Utc::now();
    let domain = store
        .update_domain(id, &mut |d: &mut Domain| {
            d.request_recheck(now);
            Ok(())
        })
        .with_context(|| format!("failed to recheck domain #{id}"))?;
    if json {
        print_json(&domain)?;
    } else {
        println!(
            "Domain #{} {} queued for recheck ({}).",
            domain.id, domain.hostname, domain.status
        );
    }
    Ok(())
}
