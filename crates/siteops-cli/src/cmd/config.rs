use crate::output::print_json;
use crate::root::load_config;
use anyhow::Context;
use clap::Subcommand;
use siteops_core::config::{Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective config (defaults filled in)
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Write a default config file if none exists
    Init,
}

pub fn run(config_path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(config_path, json),
        ConfigSubcommand::Validate => validate(config_path, json),
        ConfigSubcommand::Init => init(config_path, json),
    }
}

fn show(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    if json {
        return print_json(&config);
    }
    println!("# {}", config_path.display());
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn validate(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn init(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let written = Config::init(config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    if json {
        print_json(&serde_json::json!({
            "path": config_path,
            "created": written,
        }))?;
    } else if written {
        println!("Wrote default config to {}.", config_path.display());
    } else {
        println!("{} already exists; left unchanged.", config_path.display());
    }
    Ok(())
}
