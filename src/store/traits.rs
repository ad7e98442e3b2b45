//! Storage trait definitions

use crate::decode::DecodeError;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No cached results available")]
    NoDataAvailable,

    #[error("Invalid Google Scholar user id: {0:?}")]
    InvalidScholarId(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Source of the Google Scholar user ids to scrape.
///
/// Implementations must be thread-safe (Send + Sync); the orchestrator
/// shares one registry with the CLI.
pub trait ScholarRegistry: Send + Sync {
    /// Cheap round-trip proving the backend is reachable
    fn ping(&self) -> StorageResult<()>;

    /// All registered user ids, in insertion order
    fn list_user_ids(&self) -> StorageResult<Vec<String>>;

    /// Register a user id. Returns false if it was already present.
    fn add_user(&self, id: &str) -> StorageResult<bool>;

    /// Remove a user id. Returns false if it was not present.
    fn remove_user(&self, id: &str) -> StorageResult<bool>;
}

/// Trait for registries that can be opened from a path
pub trait OpenRegistry: ScholarRegistry + Sized {
    /// Open or create a registry at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory registry (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

/// Google Scholar user ids are short tokens like `1iQtvdsAAAAJ`.
///
/// Anything else is rejected, since ids end up on a shell command line.
pub fn is_valid_scholar_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scholar_id_validation() {
        assert!(is_valid_scholar_id("1iQtvdsAAAAJ"));
        assert!(is_valid_scholar_id("a-b_c"));
        assert!(!is_valid_scholar_id(""));
        assert!(!is_valid_scholar_id("id; rm -rf /"));
        assert!(!is_valid_scholar_id("$(whoami)"));
        assert!(!is_valid_scholar_id(&"x".repeat(65)));
    }
}
