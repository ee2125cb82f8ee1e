//! Command-line argument parsing for netqueue
//!
//! This module defines the CLI structure using clap derive macros: a `fetch`
//! command that pushes URLs through the request queue and a `cache` command
//! for inspecting the disk cache.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::request::Priority;

/// netqueue - prioritised, cached HTTP fetching
#[derive(Parser, Debug)]
#[command(
    name = "netqueue",
    version,
    about = "Fetch URLs through a prioritised, cached request queue",
    long_about = "Runs URLs through the netqueue engine: a disk-backed response cache,
deduplication of identical requests, timeout-escalating retries and a pool of network workers."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch one or more URLs through the queue
    Fetch(FetchArgs),

    /// Disk cache management
    Cache(CacheArgs),
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// URLs to fetch
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Priority for every submitted request (low, normal, high, immediate)
    #[arg(short, long, default_value = "normal")]
    pub priority: Priority,

    /// Tag attached to every submitted request
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Bypass the response cache
    #[arg(long)]
    pub no_cache: bool,

    /// Number of network workers (overrides the configuration file)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Directory to write response bodies into; bodies go to stdout otherwise
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,
}

/// Arguments for cache management
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache location, size and usage
    Info,

    /// Remove every cached response
    Clear,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level requested on the command line, if any verbosity flag was given
    pub fn requested_log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        self.requested_log_level().unwrap_or(tracing::Level::WARN)
    }
}

impl FetchArgs {
    /// Reject argument combinations the queue cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("Number of workers must be greater than 0".to_string());
        }
        if self.urls.iter().any(|url| url.trim().is_empty()) {
            return Err("URLs must not be empty".to_string());
        }
        Ok(())
    }
}
