//! Flat-file result cache
//!
//! Two files: the raw scraper output, and the decoded collection in its
//! serialized form. Raw is always written first; the serialized file is
//! derived from it and is rebuilt from raw on read when missing or corrupt.
//! Both writes go through a temp file and a rename so readers never see a
//! partial file.

use super::traits::{StorageError, StorageResult};
use crate::decode::{decode_collection, decode_results, encode_collection};
use crate::model::AuthorCollection;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// File name of the raw scraper output inside a cache directory
pub const RAW_RESULTS_FILE: &str = "results.json";

/// File name of the serialized collection inside a cache directory
pub const SERIALIZED_RESULTS_FILE: &str = "results.serialized.json";

/// Raw and serialized scrape results at fixed paths
#[derive(Debug, Clone)]
pub struct ResultStore {
    raw_path: PathBuf,
    serialized_path: PathBuf,
}

impl ResultStore {
    pub fn new(raw_path: impl Into<PathBuf>, serialized_path: impl Into<PathBuf>) -> Self {
        Self {
            raw_path: raw_path.into(),
            serialized_path: serialized_path.into(),
        }
    }

    /// Store both files under `dir` with their default names
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(RAW_RESULTS_FILE), dir.join(SERIALIZED_RESULTS_FILE))
    }

    pub fn raw_path(&self) -> &Path {
        &self.raw_path
    }

    pub fn serialized_path(&self) -> &Path {
        &self.serialized_path
    }

    pub fn has_raw(&self) -> bool {
        self.raw_path.is_file()
    }

    pub fn has_serialized(&self) -> bool {
        self.serialized_path.is_file()
    }

    /// Overwrite the raw cache
    pub fn write_raw(&self, content: &str) -> StorageResult<()> {
        write_atomic(&self.raw_path, content)?;
        Ok(())
    }

    /// Overwrite the serialized cache
    pub fn write_serialized(&self, content: &str) -> StorageResult<()> {
        write_atomic(&self.serialized_path, content)?;
        Ok(())
    }

    /// Read the raw cache. Missing or unreadable means no data.
    pub fn read_raw(&self) -> StorageResult<String> {
        fs::read_to_string(&self.raw_path).map_err(|e| {
            debug!(path = %self.raw_path.display(), error = %e, "raw cache unreadable");
            StorageError::NoDataAvailable
        })
    }

    /// Read the serialized cache, rebuilding it from raw if it is missing
    /// or unreadable.
    pub fn read_serialized(&self) -> StorageResult<String> {
        match fs::read_to_string(&self.serialized_path) {
            Ok(text) => Ok(text),
            Err(e) => {
                debug!(
                    path = %self.serialized_path.display(),
                    error = %e,
                    "serialized cache unreadable, regenerating from raw"
                );
                self.regenerate()
            }
        }
    }

    /// Decode the raw cache and rewrite the serialized cache from it.
    ///
    /// Unchanged raw input always produces identical serialized output.
    pub fn regenerate(&self) -> StorageResult<String> {
        let raw = self.read_raw()?;
        let authors = decode_results(&raw)?;
        let serialized = encode_collection(&authors)?;
        self.write_serialized(&serialized)?;
        info!(
            path = %self.serialized_path.display(),
            authors = authors.count(),
            "regenerated serialized cache"
        );
        Ok(serialized)
    }

    /// Load the cached collection.
    ///
    /// A serialized file that no longer decodes is treated like a missing
    /// one and rebuilt from raw.
    pub fn load(&self) -> StorageResult<AuthorCollection> {
        let serialized = self.read_serialized()?;
        match decode_collection(&serialized) {
            Ok(authors) => Ok(authors),
            Err(e) => {
                warn!(
                    path = %self.serialized_path.display(),
                    error = %e,
                    "serialized cache is corrupt, regenerating from raw"
                );
                Ok(decode_collection(&self.regenerate()?)?)
            }
        }
    }

    /// Persist one scrape: raw output first, then the serialized collection.
    ///
    /// Encoding happens before either write, so an encoding failure leaves
    /// both files as they were. If the serialized write fails after raw was
    /// replaced, the old serialized file is removed so the next read
    /// rebuilds it from the new raw output.
    pub fn persist(&self, raw: &str, authors: &AuthorCollection) -> StorageResult<()> {
        let serialized = encode_collection(authors)?;
        self.persist_encoded(raw, &serialized, write_atomic)
    }

    fn persist_encoded<W>(&self, raw: &str, serialized: &str, write: W) -> StorageResult<()>
    where
        W: Fn(&Path, &str) -> io::Result<()>,
    {
        write(&self.raw_path, raw)?;
        if let Err(e) = write(&self.serialized_path, serialized) {
            warn!(
                path = %self.serialized_path.display(),
                error = %e,
                "serialized cache write failed, invalidating it"
            );
            self.invalidate_serialized();
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove the serialized cache; a missing file is fine.
    pub fn invalidate_serialized(&self) {
        match fs::remove_file(&self.serialized_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!(
                path = %self.serialized_path.display(),
                error = %e,
                "cannot remove stale serialized cache"
            ),
        }
    }
}

/// Replace `path` with `content` via a sibling temp file and a rename.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(content.as_bytes())?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}
