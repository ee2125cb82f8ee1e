//! netqueue CLI application
//!
//! Command-line front end for the request engine: fetch URLs through the
//! prioritised, cached queue and manage the disk cache.

use std::process;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

// Import CLI modules through the library
use netqueue::cli::{handle_cache, handle_fetch, Cli, Commands};
use netqueue::config::AppConfig;

fn main() {
    let result = run();

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Main application logic
fn run() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let mut config =
        AppConfig::load(cli.global.config.as_deref()).context("Failed to load configuration")?;
    if let Some(cache_dir) = &cli.global.cache_dir {
        config.cache.root = Some(cache_dir.clone());
    }

    init_logging(&cli, &config)?;

    info!("netqueue v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Fetch(args) => {
            info!("Executing fetch command");
            handle_fetch(args, &config)?;
        }
        Commands::Cache(args) => {
            info!("Executing cache command");
            handle_cache(args, &config)?;
        }
    }
    Ok(())
}

/// Initialize logging from CLI verbosity, falling back to the configured level
fn init_logging(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    let log_level = match cli.requested_log_level() {
        Some(level) => level.to_string().to_lowercase(),
        None => config.logging.level.clone(),
    };

    let filter = EnvFilter::from_default_env().add_directive(
        format!("netqueue={}", log_level)
            .parse()
            .with_context(|| format!("Invalid log level: {}", log_level))?,
    );

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
    Ok(())
}
