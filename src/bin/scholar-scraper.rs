//! Scholar Scraper CLI: run scrapes, manage scholars, render the cache.
//!
//! Usage:
//!   scholar-scraper scrape [--config path]
//!   scholar-scraper watch --interval SECS
//!   scholar-scraper render [--count N] [--sort-by FIELD] [--direction asc|desc]
//!   scholar-scraper users <add|remove|list>
//!   scholar-scraper status

use clap::{Parser, Subcommand};
use scholar_scraper::{
    DisplayRequest, FileLock, OpenRegistry, PresentationPipeline, ScholarRegistry,
    ScrapeLock, ScrapeOrchestrator, ScrapeOutcome, ScraperConfig, SqliteRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "scholar-scraper",
    version,
    about = "Scheduled Google Scholar scraping with a cached publication list"
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scrape now
    Scrape,
    /// Scrape on a fixed interval until interrupted
    Watch {
        /// Seconds between scrapes
        #[arg(long, default_value_t = 86_400)]
        interval: u64,
    },
    /// Print the cached publication list as HTML
    Render {
        /// Number of publications to show
        #[arg(long)]
        count: Option<String>,
        /// Field to sort by: title, authors, year, venue, cites, url, abstract
        #[arg(long)]
        sort_by: Option<String>,
        /// Sort direction: asc or desc
        #[arg(long)]
        direction: Option<String>,
    },
    /// Manage the Google Scholar users to scrape
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
    /// Show lock and cache state
    Status,
}

#[derive(Subcommand)]
enum UsersAction {
    /// Register a Google Scholar user id
    Add {
        /// User id, as in scholar.google.com/citations?user=<ID>
        id: String,
    },
    /// Remove a Google Scholar user id
    Remove {
        /// User id to remove
        id: String,
    },
    /// List registered user ids
    List,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn open_registry(config: &ScraperConfig) -> Result<SqliteRegistry, String> {
    let path = config.registry_path();
    SqliteRegistry::open(&path)
        .map_err(|e| format!("Failed to open registry {}: {}", path.display(), e))
}

fn orchestrator(config: &ScraperConfig) -> Result<ScrapeOrchestrator, String> {
    let registry = open_registry(config)?;
    Ok(ScrapeOrchestrator::from_config(config, Arc::new(registry)))
}

fn report_outcome(outcome: &ScrapeOutcome) -> i32 {
    match outcome {
        ScrapeOutcome::Completed(report) => {
            println!(
                "Scraped {} authors, {} publications ({} bytes)",
                report.authors, report.publications, report.raw_bytes
            );
            0
        }
        ScrapeOutcome::AlreadyRunning => {
            println!("A scrape is already running");
            0
        }
        ScrapeOutcome::Aborted(e) => {
            eprintln!("Error: scrape aborted: {}", e);
            1
        }
    }
}

async fn cmd_scrape(config: &ScraperConfig) -> i32 {
    let orchestrator = match orchestrator(config) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    report_outcome(&orchestrator.run().await)
}

async fn cmd_watch(config: &ScraperConfig, interval_secs: u64) -> i32 {
    if interval_secs == 0 {
        eprintln!("Error: --interval must be at least 1 second");
        return 1;
    }
    let orchestrator = match orchestrator(config) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs, "watching; Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = tokio::signal::ctrl_c() => return stopped(signal),
        }
        // Dropping an interrupted run kills its scraper and releases the lock
        tokio::select! {
            outcome = orchestrator.run() => {
                report_outcome(&outcome);
            }
            signal = tokio::signal::ctrl_c() => return stopped(signal),
        }
    }
}

fn stopped(signal: std::io::Result<()>) -> i32 {
    if let Err(e) = signal {
        warn!(error = %e, "cannot listen for Ctrl-C");
        return 1;
    }
    info!("stopping");
    0
}

fn cmd_render(
    config: &ScraperConfig,
    count: Option<String>,
    sort_by: Option<String>,
    direction: Option<String>,
) -> i32 {
    let request = DisplayRequest {
        number_papers_to_show: count,
        sort_by_field: sort_by,
        sort_by_direction: direction,
    };
    let pipeline = PresentationPipeline::new(config.result_store(), config.display.clone());
    println!("{}", pipeline.render(&request));
    0
}

fn cmd_users(config: &ScraperConfig, action: UsersAction) -> i32 {
    let registry = match open_registry(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match action {
        UsersAction::Add { id } => match registry.add_user(&id) {
            Ok(true) => {
                println!("Added '{}'", id);
                0
            }
            Ok(false) => {
                println!("'{}' is already registered", id);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        UsersAction::Remove { id } => match registry.remove_user(&id) {
            Ok(true) => {
                println!("Removed '{}'", id);
                0
            }
            Ok(false) => {
                eprintln!("Error: '{}' is not registered", id);
                1
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        UsersAction::List => match registry.list_user_ids() {
            Ok(ids) if ids.is_empty() => {
                println!("No scholars registered.");
                0
            }
            Ok(ids) => {
                for id in ids {
                    println!("{}", id);
                }
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
    }
}

fn cmd_status(config: &ScraperConfig) -> i32 {
    let lock = FileLock::new(config.lock_path());
    let now = chrono::Utc::now();
    match lock.current() {
        Ok(Some(record)) if record.is_active(now) => {
            println!("Lock:       held until {}", record.expires_at.to_rfc3339())
        }
        Ok(Some(record)) => println!("Lock:       expired at {}", record.expires_at.to_rfc3339()),
        Ok(None) => println!("Lock:       free"),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    let store = config.result_store();
    let presence = |present: bool| if present { "present" } else { "missing" };
    println!("Raw cache:  {} ({})", presence(store.has_raw()), store.raw_path().display());
    println!(
        "Serialized: {} ({})",
        presence(store.has_serialized()),
        store.serialized_path().display()
    );

    match open_registry(config).and_then(|r| r.list_user_ids().map_err(|e| e.to_string())) {
        Ok(ids) => println!("Scholars:   {}", ids.len()),
        Err(e) => println!("Scholars:   unavailable ({})", e),
    }
    0
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match ScraperConfig::load_or_default(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Scrape => cmd_scrape(&config).await,
        Commands::Watch { interval } => cmd_watch(&config, interval).await,
        Commands::Render {
            count,
            sort_by,
            direction,
        } => cmd_render(&config, count, sort_by, direction),
        Commands::Users { action } => cmd_users(&config, action),
        Commands::Status => cmd_status(&config),
    };
    std::process::exit(code);
}
