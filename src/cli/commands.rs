//! Command handlers for the netqueue CLI
//!
//! This module implements the command handlers that coordinate between
//! CLI arguments and the request engine.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use url::Url;

use crate::app::cache::{CacheStore, DiskCache, DiskCacheStats};
use crate::app::delivery::Event;
use crate::app::queue::RequestQueue;
use crate::app::request::{BytesParser, RequestBuilder};
use crate::app::transport::ReqwestTransport;
use crate::cli::{CacheAction, CacheArgs, FetchArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the fetch command
///
/// Submits every URL to a freshly started queue, writes each body as it
/// arrives and waits until every request has finished.
pub fn handle_fetch(args: FetchArgs, config: &AppConfig) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    let (mut queue_config, cache_config, transport_config) = config.to_runtime_config();
    if let Some(workers) = args.workers {
        queue_config.network_workers = workers;
    }
    info!(
        "Fetching {} URLs with {} workers",
        args.urls.len(),
        queue_config.network_workers
    );

    if let Some(output) = &args.output {
        fs::create_dir_all(output)?;
    }

    let queue = RequestQueue::builder()
        .config(queue_config)
        .cache(Arc::new(DiskCache::new(cache_config)?))
        .transport(Arc::new(ReqwestTransport::new(&transport_config)?))
        .build()?;
    queue.start()?;

    let start_time = Instant::now();
    let total = args.urls.len();
    let progress = fetch_progress_bar(total, args.progress)?;
    let (sender, receiver) = crossbeam_channel::unbounded();

    for (index, url) in args.urls.iter().enumerate() {
        let sender = sender.clone();
        let mut builder = RequestBuilder::get(url.as_str()).priority(args.priority);
        if let Some(tag) = &args.tag {
            builder = builder.tag(tag.as_str());
        }
        if args.no_cache {
            builder = builder.should_cache(false);
        }

        let request = builder.build(BytesParser, move |event: Event<Vec<u8>>| {
            let _ = sender.send((index, event));
        });
        queue.submit(request);
    }
    drop(sender);

    let mut finished = 0;
    let mut failed = 0;
    while finished < total {
        let Ok((index, event)) = receiver.recv() else {
            break;
        };
        let url = &args.urls[index];

        match event {
            Event::UsedCache => debug!("Served from cache: {}", url),
            Event::Retry => debug!("Retrying: {}", url),
            Event::Progress {
                total: expected,
                transferred,
            } => match expected {
                Some(expected) => {
                    progress.set_message(format!("{} {}/{}", url, transferred, expected))
                }
                None => progress.set_message(format!("{} {}", url, transferred)),
            },
            Event::Success(body) => {
                if let Err(e) = write_body(index, url, &body, args.output.as_deref()) {
                    warn!("Failed to write body of {}: {}", url, e);
                    failed += 1;
                }
            }
            Event::Error(e) => {
                progress.suspend(|| eprintln!("✗ {}: {}", url, e));
                failed += 1;
            }
            Event::Cancel => {
                progress.suspend(|| eprintln!("✗ {}: cancelled", url));
                failed += 1;
            }
            Event::Finish => {
                finished += 1;
                progress.inc(1);
            }
            _ => {}
        }
    }

    progress.finish_and_clear();
    queue.stop()?;

    let stats = queue.stats();
    info!("{}", stats.summary());
    eprintln!(
        "Fetched {}/{} URLs in {:.1}s",
        total - failed,
        total,
        start_time.elapsed().as_secs_f64()
    );

    if failed > 0 {
        return Err(AppError::generic(format!(
            "{} of {} requests failed",
            failed, total
        )));
    }
    Ok(())
}

/// Handle cache management commands
pub fn handle_cache(args: CacheArgs, config: &AppConfig) -> Result<()> {
    let cache = DiskCache::new(config.cache.to_runtime_config())?;
    cache.initialize()?;

    match args.action {
        CacheAction::Info => {
            print_cache_info(&cache.stats());
            Ok(())
        }
        CacheAction::Clear => {
            let before = cache.stats();
            cache.clear()?;
            println!(
                "Removed {} cached responses ({:.1} MB) from {}",
                before.entries,
                megabytes(before.total_size),
                before.root.display()
            );
            Ok(())
        }
    }
}

fn print_cache_info(stats: &DiskCacheStats) {
    println!("💾 Cache Information");
    println!("===================");
    println!("Location: {}", stats.root.display());
    println!("Cached responses: {}", stats.entries);
    println!(
        "Cache size: {:.1} MB of {:.1} MB ({:.1}%)",
        megabytes(stats.total_size),
        megabytes(stats.max_size),
        stats.usage_percentage()
    );
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn fetch_progress_bar(total: usize, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }

    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .map_err(|e| AppError::generic(format!("Progress bar template error: {}", e)))?
            .progress_chars("#>-"),
    );
    Ok(bar)
}

/// Write a response body to the output directory, or stdout when none is set
fn write_body(index: usize, url: &str, body: &[u8], output: Option<&Path>) -> io::Result<()> {
    match output {
        Some(dir) => {
            let path = dir.join(output_file_name(index, url));
            fs::write(&path, body)?;
            debug!("Wrote {} bytes to {}", body.len(), path.display());
            Ok(())
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(body)?;
            stdout.flush()
        }
    }
}

/// File name for the body of the `index`th URL, numbered to keep duplicates apart
fn output_file_name(index: usize, url: &str) -> String {
    let name = Url::parse(url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "index".to_string());
    format!("{:03}-{}", index + 1, name)
}
