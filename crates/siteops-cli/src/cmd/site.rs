use crate::output::{or_dash, print_json, print_table, when};
use crate::root::open_store;
use anyhow::{bail, Context};
use clap::Subcommand;
use siteops_core::entity::{PublishTarget, Site, MAX_AUTOPOST_FREQUENCY_SECS};
use siteops_core::store::Store;
use std::path::Path;

#[derive(Subcommand)]
pub enum SiteSubcommand {
    /// Create a site
    Add {
        name: String,
        /// Domain the site is served from
        #[arg(long)]
        domain: Option<u64>,
        /// Base URL of the site's publishing endpoint
        #[arg(long)]
        publish_url: Option<String>,
        /// Bearer token for the publishing endpoint
        #[arg(long, env = "SITEOPS_PUBLISH_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// List sites
    List,
    /// Configure autoposting for a site
    Autopost {
        id: u64,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Seconds between autoposts
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
    },
}

pub fn run(config_path: &Path, subcmd: SiteSubcommand, json: bool) -> anyhow::Result<()> {
    let store = open_store(config_path)?;
    match subcmd {
        SiteSubcommand::Add {
            name,
            domain,
            publish_url,
            token,
        } => add(&store, &name, domain, publish_url, token, json),
        SiteSubcommand::List => list(&store, json),
        SiteSubcommand::Autopost {
            id,
            enable,
            disable,
            every,
        } => autopost(&store, id, enable, disable, every, json),
    }
}

fn add(
    store: &dyn Store,
    name: &str,
    domain: Option<u64>,
    publish_url: Option<String>,
    token: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut site = store
        .insert_site(name, domain)
        .with_context(|| format!("failed to add site '{name}'"))?;
    if let Some(url) = publish_url {
        let target = PublishTarget { url, token };
        site = store
            .update_site(site.id, &mut |s: &mut Site| {
                s.publish_target = Some(target.clone());
                Ok(())
            })
            .context("failed to set publish target")?;
    }
    if json {
        print_json(&site)?;
    } else {
        println!("Added site #{} '{}'.", site.id, site.name);
    }
    Ok(())
}

fn list(store: &dyn Store, json: bool) -> anyhow::Result<()> {
    let sites = store.list_sites().context("failed to list sites")?;

    if json {
        return print_json(&sites);
    }
    if sites.is_empty() {
        println!("No sites.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = sites
        .iter()
        .map(|s| {
            let autopost = if s.autopost_enabled {
                format!("every {}s", s.autopost_frequency_secs)
            } else {
                "off".to_string()
            };
            vec![
                s.id.to_string(),
                s.name.clone(),
                or_dash(s.domain_id),
                autopost,
                when(s.last_autopost_at),
                or_dash(s.publish_target.as_ref().map(|t| t.url.clone())),
            ]
        })
        .collect();
    print_table(
        &["ID", "NAME", "DOMAIN", "AUTOPOST", "LAST AUTOPOST", "PUBLISH URL"],
        rows,
    );
    Ok(())
}

fn autopost(
    store: &dyn Store,
    id: u64,
    enable: bool,
    disable: bool,
    every: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(secs) = every {
        if secs == 0 || secs > MAX_AUTOPOST_FREQUENCY_SECS {
            bail!("--every must be between 1 and {MAX_AUTOPOST_FREQUENCY_SECS} seconds");
        }
    }
    let site = store
        .update_site(id, &mut |s: &mut Site| {
            if enable {
                s.autopost_enabled = true;
            }
            if disable {
                s.autopost_enabled = false;
            }
            if let Some(secs) = every {
                s.autopost_frequency_secs = secs;
            }
            Ok(())
        })
        .with_context(|| format!("failed to update site #{id}"))?;
    if json {
        print_json(&site)?;
    } else if site.autopost_enabled {
        println!(
            "Site #{} autoposts every {}s (next due {}).",
            site.id,
            site.autopost_frequency_secs,
            match (site.last_autopost_at, site.autopost_due_at()) {
                (None, _) => "now".to_string(),
                (Some(_), Some(at)) => when(Some(at)),
                (Some(_), None) => "never".to_string(),
            }
        );
    } else {
        println!("Site #{} autoposting is off.", site.id);
    }
    Ok(())
}
