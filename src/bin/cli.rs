//! flatwatch CLI
//!
//! Local entry point for polling, one-off checks and cache maintenance.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flatwatch::{
    error::Result,
    models::Config,
    pipeline::{LogNotifier, Monitor},
    services::Orchestrator,
    storage::DedupCache,
    utils::http::HttpClient,
};

/// flatwatch - Berlin flat listing monitor
#[derive(Parser, Debug)]
#[command(
    name = "flatwatch",
    version,
    about = "Polls Berlin housing providers for new flat listings"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll all sources until Ctrl-C
    Run,

    /// Run a single cycle and print records and statuses as JSON
    Once,

    /// Run a single cycle and print the first listing of every source
    Test,

    /// Forget all seen listings
    Clear,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn orchestrator(config: &Config) -> Result<Orchestrator> {
    let client = HttpClient::new(&config.client)?;
    Orchestrator::from_config(config, Arc::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run => {
            config.validate()?;
            let client = HttpClient::new(&config.client)?;
            let mut monitor = Monitor::from_config(&config, Arc::new(client), Arc::new(LogNotifier))?;

            log::info!(
                "Polling every {}s, cache at {}",
                config.monitor.interval_secs,
                config.cache.path.display()
            );
            monitor
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::error!("Failed to listen for Ctrl-C: {}", e);
                    }
                })
                .await;

            for (source, status) in monitor.statuses() {
                log::info!("{}: {}", source, status);
            }
        }

        Command::Once => {
            config.validate()?;
            let output = orchestrator(&config)?.fetch_all().await;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Test => {
            config.validate()?;
            let output = orchestrator(&config)?.fetch_all().await;

            let firsts: BTreeMap<_, _> = output
                .statuses
                .keys()
                .filter_map(|source| output.records_of(source).next().map(|r| (source, r)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&firsts)?);

            for (source, status) in &output.statuses {
                log::info!(
                    "{}: {} ({} listings)",
                    source,
                    status,
                    output.records_of(source).count()
                );
            }
        }

        Command::Clear => {
            let cache = DedupCache::from_config(&config.cache);
            cache.reset().await;
            log::info!("Seen-id cache cleared");
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} of {} sources enabled)",
                config.enabled_sources().count(),
                config.sources.len()
            );
        }
    }

    Ok(())
}
