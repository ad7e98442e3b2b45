//! Scholar Scraper: scheduled Google Scholar scrapes with a flat-file cache
//!
//! Runs an external Python scraper for a registry of Google Scholar users,
//! caches its output, and renders the merged publication list as HTML.
//!
//! # Core Concepts
//!
//! - **Orchestrator**: single-flight scrape run behind a time-boxed lock
//! - **Runner**: executes the scraper through the first usable exec strategy
//! - **Store**: raw and serialized result caches, plus the scholar registry
//! - **Display**: merge, sort, paginate and render cached publications
//!
//! # Example
//!
//! ```
//! use scholar_scraper::{DisplayDefaults, DisplayRequest, PresentationPipeline, ResultStore};
//!
//! let dir = std::env::temp_dir().join("scholar-scraper-doc");
//! let pipeline = PresentationPipeline::new(ResultStore::in_dir(&dir), DisplayDefaults::default());
//! let html = pipeline.render(&DisplayRequest::new().count("5").sort_by("year"));
//! assert!(html.starts_with('<'));
//! ```

pub mod config;
pub mod decode;
pub mod display;
pub mod lock;
pub mod model;
pub mod orchestrator;
pub mod runner;
pub mod store;

pub use config::{ConfigError, ScraperConfig};
pub use decode::{decode_results, DecodeError};
pub use display::{
    DisplayDefaults, DisplayOptions, DisplayRequest, PresentationPipeline, SortDirection,
    PLACEHOLDER,
};
pub use lock::{Clock, FileLock, LockRecord, MemoryLock, ScrapeLock, SystemClock};
pub use model::{Author, AuthorCollection, Publication, PublicationCollection, SortField};
pub use orchestrator::{
    ScrapeError, ScrapeOrchestrator, ScrapeOutcome, ScrapeReport, ScrapeSettings, ScrapeState,
    ValidationFailure,
};
pub use runner::{CommandOutput, CommandRunner, ExecError, ExecStrategy};
pub use store::{
    OpenRegistry, ResultStore, ScholarRegistry, SqliteRegistry, StorageError, StorageResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
