use crate::output::{or_dash, print_json, print_table, when};
use crate::root::open_store;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use siteops_core::entity::{NewPost, Post};
use siteops_core::store::Store;
use siteops_core::types::PostStatus;
use std::path::Path;

#[derive(Subcommand)]
pub enum PostSubcommand {
    /// Schedule a post
    Add {
        #[arg(long)]
        site: u64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Publish time, RFC 3339 (default: now)
        #[arg(long, value_parser = parse_time)]
        at: Option<DateTime<Utc>>,
        /// Save as a draft instead of scheduling it
        #[arg(long, conflicts_with = "at")]
        draft: bool,
    },
    /// List posts
    List {
        #[arg(long)]
        site: Option<u64>,
    },
    /// Schedule a draft or failed post again
    Reschedule {
        id: u64,
        /// New publish time, RFC 3339 (default: now)
        #[arg(long, value_parser = parse_time)]
        at: Option<DateTime<Utc>>,
    },
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 time like 2026-01-31T09:00:00Z: {e}"))
}

pub fn run(config_path: &Path, subcmd: PostSubcommand, json: bool) -> anyhow::Result<()> {
    let store = open_store(config_path)?;
    match subcmd {
        PostSubcommand::Add {
            site,
            title,
            body,
            at,
            draft,
        } => add(&store, site, title, body, at, draft, json),
        PostSubcommand::List { site } => list(&store, site, json),
        PostSubcommand::Reschedule { id, at } => reschedule(&store, id, at, json),
    }
}

fn add(
    store: &dyn Store,
    site: u64,
    title: String,
    body: String,
    at: Option<DateTime<Utc>>,
    draft: bool,
    json: bool,
) -> anyhow::Result<()> {
    store
        .get_site(site)?
        .ok_or_else(|| anyhow!("site #{site} not found"))?;
    let mut new = NewPost::scheduled(site, title, body, at.unwrap_or_else(Utc::now));
    if draft {
        new.status = PostStatus::Draft;
        new.scheduled_at = None;
    }
    let post = store.insert_post(new).context("failed to add post")?;
    if json {
        print_json(&post)?;
    } else {
        println!(
            "Added post #{} '{}' ({}, {}).",
            post.id,
            post.title,
            post.status,
            when(post.scheduled_at)
        );
    }
    Ok(())
}

fn list(store: &dyn Store, site: Option<u64>, json: bool) -> anyhow::Result<()> {
    let posts = store.list_posts(site).context("failed to list posts")?;

    if json {
        return print_json(&posts);
    }
    if posts.is_empty() {
        println!("No posts.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = posts
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.site_id.to_string(),
                p.title.clone(),
                p.status.to_string(),
                when(p.scheduled_at),
                when(p.published_at),
                or_dash(p.external_url.clone().or_else(|| p.last_error.clone())),
            ]
        })
        .collect();
    print_table(
        &["ID", "SITE", "TITLE", "STATUS", "SCHEDULED", "PUBLISHED", "URL / ERROR"],
        rows,
    );
    Ok(())
}

fn reschedule(
    store: &dyn Store,
    id: u64,
    at: Option<DateTime<Utc>>,
    json: bool,
) -> anyhow::Result<()> {
    let at = at.unwrap_or_else(Utc::now);
    let post = store
        .update_post(id, &mut |p: &mut Post| {
            if p.status == PostStatus::Published {
                return Err(siteops_core::SiteopsError::InvalidTransition {
                    from: p.status.to_string(),
                    to: PostStatus::Scheduled.to_string(),
                });
            }
            p.status = PostStatus::Scheduled;
            p.scheduled_at = Some(at);
            p.last_error = None;
            p.updated_at = Utc::now();
            Ok(())
        })
        .with_context(|| format!("failed to reschedule post #{id}"))?;
    if json {
        print_json(&post)?;
    } else {
        println!("Post #{} scheduled for {}.", post.id, when(post.scheduled_at));
    }
    Ok(())
}
