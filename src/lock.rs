//! Time-boxed single-flight lock for scrape runs
//!
//! The lock is an explicit record `{owner, held, expires_at}`. Acquiring
//! fails while an unexpired record is held; an expired record counts as
//! free, so a crashed run blocks others for at most one TTL. Only the owner
//! that took the lock can release it.

use crate::store::{StorageError, StorageResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

/// Source of "now", injected so tests control expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|_| Utc::now())
    }
}

/// The persisted state of the scrape lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Run that holds the lock
    pub owner: Uuid,
    pub held: bool,
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn held_until(owner: Uuid, expires_at: DateTime<Utc>) -> Self {
        Self {
            owner,
            held: true,
            expires_at,
        }
    }

    /// Held and not yet expired at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.held && now < self.expires_at
    }
}

/// A lock that at most one scrape can hold at a time.
///
/// Contention is reported, never waited on.
pub trait ScrapeLock: Send + Sync {
    /// Take the lock for `owner` until `now + ttl`. Returns false if it is
    /// already held.
    fn try_acquire(&self, owner: Uuid, now: DateTime<Utc>, ttl: Duration) -> StorageResult<bool>;

    /// Clear the lock if `owner` still holds it. Otherwise a no-op.
    fn release(&self, owner: Uuid) -> StorageResult<()>;

    /// Current record, if any
    fn current(&self) -> StorageResult<Option<LockRecord>>;
}

/// Process-local lock
#[derive(Debug, Default)]
pub struct MemoryLock {
    record: Mutex<Option<LockRecord>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Option<LockRecord>> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ScrapeLock for MemoryLock {
    fn try_acquire(&self, owner: Uuid, now: DateTime<Utc>, ttl: Duration) -> StorageResult<bool> {
        let mut record = self.guard();
        if matches!(*record, Some(r) if r.is_active(now)) {
            return Ok(false);
        }
        *record = Some(LockRecord::held_until(owner, now + ttl));
        Ok(true)
    }

    fn release(&self, owner: Uuid) -> StorageResult<()> {
        let mut record = self.guard();
        if matches!(*record, Some(r) if r.owner == owner) {
            *record = None;
        }
        Ok(())
    }

    fn current(&self) -> StorageResult<Option<LockRecord>> {
        Ok(*self.guard())
    }
}

/// How long an unreadable lock file or an abandoned claim file is left alone
/// before it is considered debris from a crashed process.
const STALE_FILE_GRACE: std::time::Duration = std::time::Duration::from_secs(30);

const CLAIM_ATTEMPTS: u32 = 50;
const CLAIM_BACKOFF: std::time::Duration = std::time::Duration::from_millis(10);

/// What is currently at the lock path
enum LockFileState {
    Missing,
    Active,
    Stale,
}

/// Lock shared between processes through a JSON file.
///
/// A new record is fully written to a temp file and then published with
/// `hard_link`, which fails if the lock file exists, so readers never see a
/// partial record and two fresh acquirers cannot both succeed. Replacing an
/// expired record and releasing both happen while holding a sibling claim
/// file created with `create_new`, so those read-check-write steps never
/// interleave across processes.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

/// Exclusive right to inspect and replace the lock file. Removed on drop.
struct Claim {
    path: PathBuf,
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "cannot remove lock claim");
            }
        }
    }
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn claim_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".claim");
        self.path.with_file_name(name)
    }

    /// Write `record` to a temp file beside the lock file.
    fn stage(&self, record: &LockRecord) -> StorageResult<NamedTempFile> {
        let mut staged = NamedTempFile::new_in(self.dir())?;
        staged.write_all(serde_json::to_string(record)?.as_bytes())?;
        staged.as_file().sync_all()?;
        Ok(staged)
    }

    /// Publish a staged record if no lock file exists.
    fn publish(&self, staged: &NamedTempFile) -> StorageResult<bool> {
        match fs::hard_link(staged.path(), &self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn read_record(&self) -> StorageResult<Option<Result<LockRecord, serde_json::Error>>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn state(&self, now: DateTime<Utc>) -> StorageResult<LockFileState> {
        match self.read_record()? {
            None => Ok(LockFileState::Missing),
            Some(Ok(record)) if record.is_active(now) => Ok(LockFileState::Active),
            Some(Ok(_)) => Ok(LockFileState::Stale),
            Some(Err(e)) => {
                if is_older_than(&self.path, STALE_FILE_GRACE) {
                    warn!(path = %self.path.display(), error = %e, "discarding unreadable scrape lock");
                    Ok(LockFileState::Stale)
                } else {
                    debug!(path = %self.path.display(), error = %e, "unreadable scrape lock is recent");
                    Ok(LockFileState::Active)
                }
            }
        }
    }

    /// Take the claim once. `None` while another process holds it.
    fn try_claim(&self) -> StorageResult<Option<Claim>> {
        let path = self.claim_path();
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(Claim { path })),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if is_older_than(&path, STALE_FILE_GRACE) {
                    warn!(path = %path.display(), "removing abandoned lock claim");
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(StorageError::Io(e)),
                    }
                }
                Ok(None)
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Take the claim, waiting briefly for another holder to finish.
    fn claim(&self) -> StorageResult<Option<Claim>> {
        for _ in 0..CLAIM_ATTEMPTS {
            if let Some(claim) = self.try_claim()? {
                return Ok(Some(claim));
            }
            std::thread::sleep(CLAIM_BACKOFF);
        }
        Ok(None)
    }
}

impl ScrapeLock for FileLock {
    fn try_acquire(&self, owner: Uuid, now: DateTime<Utc>, ttl: Duration) -> StorageResult<bool> {
        fs::create_dir_all(self.dir())?;

        let staged = self.stage(&LockRecord::held_until(owner, now + ttl))?;
        if self.publish(&staged)? {
            return Ok(true);
        }

        if matches!(self.state(now)?, LockFileState::Active) {
            return Ok(false);
        }

        // Someone else claiming means someone else is taking over
        let Some(_claim) = self.try_claim()? else {
            return Ok(false);
        };
        match self.state(now)? {
            LockFileState::Active => Ok(false),
            LockFileState::Missing => self.publish(&staged),
            LockFileState::Stale => {
                debug!(path = %self.path.display(), %owner, "taking over expired scrape lock");
                staged
                    .persist(&self.path)
                    .map_err(|e| StorageError::Io(e.error))?;
                Ok(true)
            }
        }
    }

    fn release(&self, owner: Uuid) -> StorageResult<()> {
        let Some(_claim) = self.claim()? else {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::WouldBlock,
                "scrape lock claim is busy",
            )));
        };

        match self.read_record()? {
            Some(Ok(record)) if record.owner == owner => match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::Io(e)),
            },
            Some(_) => {
                debug!(path = %self.path.display(), %owner, "scrape lock belongs to another run");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn current(&self) -> StorageResult<Option<LockRecord>> {
        match self.read_record()? {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => {
                warn!(path = %self.path.display(), error = %e, "unreadable scrape lock");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

fn is_older_than(path: &Path, age: std::time::Duration) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|elapsed| elapsed > age)
}

/// Releases the lock when dropped, on every exit path.
pub struct LockGuard {
    lock: Arc<dyn ScrapeLock>,
    owner: Uuid,
}

impl LockGuard {
    /// Try to take `lock` for `owner`; `None` when another run holds it.
    pub fn acquire(
        lock: Arc<dyn ScrapeLock>,
        owner: Uuid,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> StorageResult<Option<Self>> {
        if lock.try_acquire(owner, now, ttl)? {
            Ok(Some(Self { lock, owner }))
        } else {
            Ok(None)
        }
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release(self.owner) {
            warn!(owner = %self.owner, error = %e, "failed to release scrape lock");
        }
    }
}
