//! Storage backends
//!
//! `ResultStore` keeps the raw and serialized scrape results on disk;
//! `SqliteRegistry` holds the Google Scholar user ids to scrape.

mod cache;
mod sqlite;
mod traits;

pub use cache::{write_atomic, ResultStore, RAW_RESULTS_FILE, SERIALIZED_RESULTS_FILE};
pub use sqlite::SqliteRegistry;
pub use traits::{
    is_valid_scholar_id, OpenRegistry, ScholarRegistry, StorageError, StorageResult,
};
