mod logging;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use pagewatch_core::ExternalDecl;
use pagewatch_engine::{WatchEvent, WatcherConfig, WatcherHandle};

use crate::logging::LogDestination;

/// Polls a page's scripts and stylesheets and signals reloads on change.
#[derive(Debug, Parser)]
#[command(name = "pagewatch", version)]
struct Cli {
    /// Page to watch, e.g. http://localhost:8000/index.html
    page: String,

    /// Poll interval in milliseconds.
    #[arg(long, default_value_t = 700)]
    interval: u64,

    /// Rediscovery interval in milliseconds; 0 disables rediscovery.
    #[arg(long, default_value_t = 7000)]
    rescan: u64,

    /// Also watch minified assets (skipped by default).
    #[arg(long)]
    include_minified: bool,

    /// Extra resource URLs to watch, beyond what the page references.
    #[arg(long = "watch", value_name = "URL")]
    extra: Vec<String>,

    /// Directory for persisted options and the stopped marker.
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Write logs to ./pagewatch.log in addition to the terminal.
    #[arg(long)]
    log_file: bool,

    /// Log verbosely.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let destination = if cli.log_file {
        LogDestination::Both
    } else {
        LogDestination::Terminal
    };
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::initialize(destination, level);

    let mut config = WatcherConfig::new(&cli.page)?;
    config.options.interval_ms = cli.interval;
    config.options.rescan_ms = cli.rescan;
    config.options.ignore_minified = !cli.include_minified;
    config.store_dir = cli.state_dir;
    if !cli.extra.is_empty() {
        config.declared = Some(ExternalDecl::List(cli.extra));
    }

    log::info!("watching {}", config.page);
    let handle = WatcherHandle::new(config)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    while running.load(Ordering::SeqCst) {
        match handle.recv_timeout(Duration::from_millis(200)) {
            Some(WatchEvent::Tracked { url, .. }) => log::info!("tracking {url}"),
            Some(WatchEvent::ChangeDetected { url }) => log::info!("change detected in {url}"),
            Some(WatchEvent::StylesheetSwapped { href }) => log::info!("stylesheet swapped: {href}"),
            Some(WatchEvent::ReloadRequested { delay_ms }) if delay_ms > 0 => {
                log::info!("reload requested in {delay_ms} ms")
            }
            Some(WatchEvent::ReloadRequested { .. }) => log::info!("reload requested"),
            Some(WatchEvent::Started) => log::info!("watcher started"),
            Some(WatchEvent::Stopped) => log::info!("watcher stopped"),
            None => {}
        }
    }

    log::info!("shutting down");
    handle.close();
    Ok(())
}
