mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, domain::DomainSubcommand, post::PostSubcommand,
    server::ServerSubcommand, site::SiteSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "siteops",
    about = "Keep a fleet of sites reconciled: domains, SSL, scheduled posts, autoposting and server health",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest siteops.yaml above the current directory)
    #[arg(long, global = true, env = "SITEOPS_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler daemon until Ctrl-C
    Run,

    /// Fire one trigger now and wait for its sweep
    Tick {
        /// Trigger name from the config's trigger table
        trigger: String,
    },

    /// Show configured triggers and their ledger entries
    Triggers,

    /// Manage domains
    Domain {
        #[command(subcommand)]
        subcommand: DomainSubcommand,
    },

    /// Manage sites and autoposting
    Site {
        #[command(subcommand)]
        subcommand: SiteSubcommand,
    },

    /// Manage posts
    Post {
        #[command(subcommand)]
        subcommand: PostSubcommand,
    },

    /// Manage hosting servers
    Server {
        #[command(subcommand)]
        subcommand: ServerSubcommand,
    },

    /// Inspect, validate or create the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run | Commands::Tick { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config_path = root::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Run => cmd::run::run(&config_path),
        Commands::Tick { trigger } => cmd::tick::run(&config_path, &trigger, cli.json),
        Commands::Triggers => cmd::triggers::run(&config_path, cli.json),
        Commands::Domain { subcommand } => cmd::domain::run(&config_path, subcommand, cli.json),
        Commands::Site { subcommand } => cmd::site::run(&config_path, subcommand, cli.json),
        Commands::Post { subcommand } => cmd::post::run(&config_path, subcommand, cli.json),
        Commands::Server { subcommand } => cmd::server::run(&config_path, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
