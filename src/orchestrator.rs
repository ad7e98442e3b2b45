//! Scrape orchestration
//!
//! One scrape walks `Idle → Locked → Validating → Running → Decoding →
//! Persisted → Idle`. Any failure moves to `Aborted` and then back to
//! `Idle`. The lock is taken first and released on every exit path, so at
//! most one scrape runs at a time; contention is reported as
//! [`ScrapeOutcome::AlreadyRunning`] rather than waited on.
//!
//! Nothing is written until the scraper output has decoded, so an aborted
//! run leaves the previous cache exactly as it was.

use crate::config::ScraperConfig;
use crate::decode::{decode_results, DecodeError};
use crate::lock::{Clock, FileLock, LockGuard, ScrapeLock, SystemClock};
use crate::runner::{merge_stderr, shell_quote, CommandRunner, ExecError};
use crate::store::{is_valid_scholar_id, ResultStore, ScholarRegistry, StorageError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Paths and limits a scrape needs, taken from the config.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeSettings {
    pub python_path: Option<PathBuf>,
    pub pip_path: Option<PathBuf>,
    pub script_path: PathBuf,
    pub requirements_path: PathBuf,
    pub lock_ttl: chrono::Duration,
}

impl From<&ScraperConfig> for ScrapeSettings {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            python_path: config.python_path.clone(),
            pip_path: config.pip_path.clone(),
            script_path: config.script_path.clone(),
            requirements_path: config.requirements_path.clone(),
            lock_ttl: config.lock_ttl(),
        }
    }
}

/// A precondition that stopped a scrape before the scraper ran.
#[derive(Debug, Error)]
pub enum ValidationFailure {
    #[error("scraper script missing or unreadable: {}", .0.display())]
    ScriptMissing(PathBuf),

    #[error("python interpreter not configured or not executable")]
    InterpreterMissing,

    #[error("requirements file missing or unreadable: {}", .0.display())]
    RequirementsMissing(PathBuf),

    #[error("pip not configured or not executable")]
    PipMissing,

    #[error("dependency install exited with status {status}")]
    DependencyInstallFailed { status: i32, output: String },

    #[error("scholar registry unreachable: {0}")]
    DatabaseUnreachable(String),

    #[error("no Google Scholar users registered")]
    NoScholarUsers,
}

impl ValidationFailure {
    /// Stable reason code for logs and scripts
    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::ScriptMissing(_) => "script_missing",
            ValidationFailure::InterpreterMissing => "interpreter_missing",
            ValidationFailure::RequirementsMissing(_) => "requirements_missing",
            ValidationFailure::PipMissing => "pip_missing",
            ValidationFailure::DependencyInstallFailed { .. } => "dependency_install_failed",
            ValidationFailure::DatabaseUnreachable(_) => "database_unreachable",
            ValidationFailure::NoScholarUsers => "no_scholar_users",
        }
    }
}

/// Why a scrape was aborted
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("validation failed ({}): {0}", .0.code())]
    Validation(#[from] ValidationFailure),

    #[error("exec error: {0}")]
    Exec(#[from] ExecError),

    #[error("scraper exited with status {status}")]
    NonZeroExit { status: i32, output: String },

    #[error("cannot decode scraper output: {0}")]
    Decode(#[from] DecodeError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Summary of a completed scrape
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeReport {
    pub run_id: Uuid,
    pub authors: usize,
    pub publications: usize,
    pub raw_bytes: usize,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum ScrapeOutcome {
    Completed(ScrapeReport),
    /// Another scrape holds the lock; nothing was done
    AlreadyRunning,
    Aborted(ScrapeError),
}

impl ScrapeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ScrapeOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    Locked,
    Validating,
    Running,
    Decoding,
    Persisted,
    Aborted,
}

impl fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScrapeState::Idle => "idle",
            ScrapeState::Locked => "locked",
            ScrapeState::Validating => "validating",
            ScrapeState::Running => "running",
            ScrapeState::Decoding => "decoding",
            ScrapeState::Persisted => "persisted",
            ScrapeState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What validation hands to the running step
struct ScrapeTarget<'a> {
    interpreter: &'a Path,
    user_ids: Vec<String>,
}

pub struct ScrapeOrchestrator {
    settings: ScrapeSettings,
    runner: CommandRunner,
    store: ResultStore,
    registry: Arc<dyn ScholarRegistry>,
    lock: Arc<dyn ScrapeLock>,
    clock: Arc<dyn Clock>,
    state: Mutex<ScrapeState>,
}

impl ScrapeOrchestrator {
    pub fn new(
        settings: ScrapeSettings,
        runner: CommandRunner,
        store: ResultStore,
        registry: Arc<dyn ScholarRegistry>,
        lock: Arc<dyn ScrapeLock>,
    ) -> Self {
        Self {
            settings,
            runner,
            store,
            registry,
            lock,
            clock: Arc::new(SystemClock),
            state: Mutex::new(ScrapeState::Idle),
        }
    }

    /// Orchestrator wired from a config: default runner, file cache and
    /// a lock file shared with other processes.
    pub fn from_config(config: &ScraperConfig, registry: Arc<dyn ScholarRegistry>) -> Self {
        Self::new(
            ScrapeSettings::from(config),
            config.command_runner(),
            config.result_store(),
            registry,
            Arc::new(FileLock::new(config.lock_path())),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> ScrapeState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    fn transition(&self, run_id: Uuid, next: ScrapeState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!(%run_id, from = %*state, to = %next, "scrape state");
        *state = next;
    }

    /// Run one scrape to completion.
    pub async fn run(&self) -> ScrapeOutcome {
        let run_id = Uuid::new_v4();
        let now = self.clock.now();

        let acquired = LockGuard::acquire(self.lock.clone(), run_id, now, self.settings.lock_ttl);
        let guard = match acquired {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                info!(%run_id, "scrape already running");
                return ScrapeOutcome::AlreadyRunning;
            }
            Err(e) => {
                error!(%run_id, error = %e, "cannot take scrape lock");
                return ScrapeOutcome::Aborted(e.into());
            }
        };
        self.transition(run_id, ScrapeState::Locked);

        let result = self.run_locked(run_id).await;
        let outcome = match result {
            Ok(report) => {
                info!(
                    %run_id,
                    authors = report.authors,
                    publications = report.publications,
                    "scrape completed"
                );
                ScrapeOutcome::Completed(report)
            }
            Err(e) => {
                self.transition(run_id, ScrapeState::Aborted);
                match &e {
                    ScrapeError::Validation(failure) => {
                        warn!(%run_id, reason = failure.code(), error = %e, "scrape aborted")
                    }
                    _ => error!(%run_id, error = %e, "scrape aborted"),
                }
                ScrapeOutcome::Aborted(e)
            }
        };

        drop(guard);
        self.transition(run_id, ScrapeState::Idle);
        outcome
    }

    async fn run_locked(&self, run_id: Uuid) -> Result<ScrapeReport, ScrapeError> {
        self.transition(run_id, ScrapeState::Validating);
        let target = self.validate().await?;

        self.transition(run_id, ScrapeState::Running);
        let command = build_scrape_command(
            target.interpreter,
            &self.settings.script_path,
            &target.user_ids,
        );
        let output = self.runner.run(&command).await?;
        if !output.success() {
            return Err(ScrapeError::NonZeroExit {
                status: output.status,
                output: output.output,
            });
        }

        self.transition(run_id, ScrapeState::Decoding);
        let authors = decode_results(&output.output)?;
        self.store.persist(&output.output, &authors)?;
        self.transition(run_id, ScrapeState::Persisted);

        Ok(ScrapeReport {
            run_id,
            authors: authors.count(),
            publications: authors.publication_count(),
            raw_bytes: output.output.len(),
            finished_at: self.clock.now(),
        })
    }

    /// Check every precondition in order; the first failure wins.
    async fn validate(&self) -> Result<ScrapeTarget<'_>, ScrapeError> {
        let settings = &self.settings;

        if !is_readable_file(&settings.script_path) {
            return Err(ValidationFailure::ScriptMissing(settings.script_path.clone()).into());
        }

        let interpreter = settings
            .python_path
            .as_deref()
            .filter(|path| is_executable(path))
            .ok_or(ValidationFailure::InterpreterMissing)?;

        self.install_dependencies().await?;

        self.registry
            .ping()
            .map_err(|e| ValidationFailure::DatabaseUnreachable(e.to_string()))?;

        let user_ids = self
            .registry
            .list_user_ids()
            .map_err(|e| ValidationFailure::DatabaseUnreachable(e.to_string()))?
            .into_iter()
            .filter(|id| {
                let valid = is_valid_scholar_id(id);
                if !valid {
                    warn!(id = %id, "skipping invalid Google Scholar user id");
                }
                valid
            })
            .collect::<Vec<_>>();
        if user_ids.is_empty() {
            return Err(ValidationFailure::NoScholarUsers.into());
        }

        Ok(ScrapeTarget {
            interpreter,
            user_ids,
        })
    }

    async fn install_dependencies(&self) -> Result<(), ScrapeError> {
        let settings = &self.settings;

        if !is_readable_file(&settings.requirements_path) {
            return Err(
                ValidationFailure::RequirementsMissing(settings.requirements_path.clone()).into(),
            );
        }

        let pip = settings
            .pip_path
            .as_deref()
            .filter(|path| is_executable(path))
            .ok_or(ValidationFailure::PipMissing)?;

        let command = merge_stderr(&format!(
            "{} install -r {}",
            shell_quote(&pip.to_string_lossy()),
            shell_quote(&settings.requirements_path.to_string_lossy())
        ));
        let output = self.runner.run(&command).await?;
        if !output.success() {
            return Err(ValidationFailure::DependencyInstallFailed {
                status: output.status,
                output: output.output,
            }
            .into());
        }

        debug!(pip = %pip.display(), "scraper dependencies installed");
        Ok(())
    }
}

/// `<interpreter> <script> <id>... 2>&1`, each word shell-quoted
pub fn build_scrape_command(interpreter: &Path, script: &Path, user_ids: &[String]) -> String {
    let mut words = vec![
        shell_quote(&interpreter.to_string_lossy()).into_owned(),
        shell_quote(&script.to_string_lossy()).into_owned(),
    ];
    words.extend(user_ids.iter().map(|id| shell_quote(id).into_owned()));
    merge_stderr(&words.join(" "))
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::lock::{LockRecord, ManualClock, MemoryLock};
    use crate::runner::{ExecStrategy, MockStrategy};
    use crate::store::{OpenRegistry, SqliteRegistry, StorageResult};
    use chrono::TimeZone;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const SCRAPER_OUTPUT: &str = r#"[
        {"id": "abcDEF123", "publications": [{"title": "Paper", "cites": 3}]},
        {"id": "empty", "publications": []}
    ]"#;

    struct Fixture {
        dir: TempDir,
        settings: ScrapeSettings,
        registry: Arc<SqliteRegistry>,
        lock: Arc<MemoryLock>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("scraper.py");
            let requirements = dir.path().join("requirements.txt");
            std::fs::write(&script, "print('[]')\n").unwrap();
            std::fs::write(&requirements, "scholarly\n").unwrap();

            let settings = ScrapeSettings {
                python_path: Some(executable(&dir, "python3")),
                pip_path: Some(executable(&dir, "pip3")),
                script_path: script,
                requirements_path: requirements,
                lock_ttl: chrono::Duration::minutes(10),
            };

            let registry = Arc::new(SqliteRegistry::open_in_memory().unwrap());
            registry.add_user("abcDEF123").unwrap();

            Self {
                dir,
                settings,
                registry,
                lock: Arc::new(MemoryLock::new()),
            }
        }

        fn store(&self) -> ResultStore {
            ResultStore::in_dir(self.dir.path().join("cache"))
        }

        fn orchestrator(&self, mock: &Arc<MockStrategy>) -> ScrapeOrchestrator {
            let runner = CommandRunner::new(vec![mock.clone() as Arc<dyn ExecStrategy>]);
            ScrapeOrchestrator::new(
                self.settings.clone(),
                runner,
                self.store(),
                self.registry.clone(),
                self.lock.clone(),
            )
            .with_clock(Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            )))
        }

        fn assert_released(&self) {
            assert!(self.lock.current().unwrap().is_none());
        }
    }

    fn executable(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn happy_mock() -> Arc<MockStrategy> {
        Arc::new(
            MockStrategy::available()
                .with_response("install -r", "Requirement already satisfied", 0)
                .with_response("scraper.py", SCRAPER_OUTPUT, 0),
        )
    }

    fn aborted_code(outcome: ScrapeOutcome) -> &'static str {
        match outcome {
            ScrapeOutcome::Aborted(ScrapeError::Validation(failure)) => failure.code(),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    struct DownRegistry;

    impl ScholarRegistry for DownRegistry {
        fn ping(&self) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "down",
            )))
        }
        fn list_user_ids(&self) -> StorageResult<Vec<String>> {
            Ok(vec!["abcDEF123".into()])
        }
        fn add_user(&self, _id: &str) -> StorageResult<bool> {
            Ok(false)
        }
        fn remove_user(&self, _id: &str) -> StorageResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn successful_scrape_persists_both_caches() {
        let fixture = Fixture::new();
        let mock = happy_mock();
        let orchestrator = fixture.orchestrator(&mock);

        let report = match orchestrator.run().await {
            ScrapeOutcome::Completed(report) => report,
            other => panic!("expected completion, got {:?}", other),
        };

        assert_eq!(report.authors, 1);
        assert_eq!(report.publications, 1);
        assert_eq!(report.raw_bytes, SCRAPER_OUTPUT.len());

        let store = fixture.store();
        assert_eq!(std::fs::read_to_string(store.raw_path()).unwrap(), SCRAPER_OUTPUT);
        let cached = store.load().unwrap();
        assert_eq!(cached.count(), 1);
        assert_eq!(cached.get(0).unwrap().id, "abcDEF123");

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains(" install -r "));
        assert!(calls[1].ends_with("scraper.py abcDEF123 2>&1"));

        assert_eq!(orchestrator.state(), ScrapeState::Idle);
        fixture.assert_released();
    }

    #[tokio::test]
    async fn held_lock_short_circuits_without_running() {
        let fixture = Fixture::new();
        let mock = happy_mock();
        let orchestrator = fixture.orchestrator(&mock);

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 11, 59, 0).unwrap();
        let other_run = Uuid::new_v4();
        assert!(fixture
            .lock
            .try_acquire(other_run, now, chrono::Duration::minutes(10))
            .unwrap());

        assert!(matches!(orchestrator.run().await, ScrapeOutcome::AlreadyRunning));
        assert_eq!(mock.call_count(), 0);
        // The other run's lock is left alone
        assert_eq!(
            fixture.lock.current().unwrap(),
            Some(LockRecord::held_until(other_run, now + chrono::Duration::minutes(10)))
        );
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over() {
        let fixture = Fixture::new();
        let mock = happy_mock();
        let orchestrator = fixture.orchestrator(&mock);

        let long_ago = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert!(fixture
            .lock
            .try_acquire(Uuid::new_v4(), long_ago, chrono::Duration::hours(1))
            .unwrap());

        assert!(orchestrator.run().await.is_completed());
        fixture.assert_released();
    }

    #[tokio::test]
    async fn missing_script_aborts_first() {
        let mut fixture = Fixture::new();
        fixture.settings.script_path = fixture.dir.path().join("nope.py");
        fixture.settings.python_path = None;
        let mock = happy_mock();

        assert_eq!(aborted_code(fixture.orchestrator(&mock).run().await), "script_missing");
        assert_eq!(mock.call_count(), 0);
        fixture.assert_released();
    }

    #[tokio::test]
    async fn interpreter_must_be_configured_and_executable() {
        let mut fixture = Fixture::new();
        fixture.settings.python_path = None;
        let mock = happy_mock();
        assert_eq!(aborted_code(fixture.orchestrator(&mock).run().await), "interpreter_missing");

        let not_executable = fixture.dir.path().join("python-noexec");
        std::fs::write(&not_executable, "").unwrap();
        std::fs::set_permissions(&not_executable, std::fs::Permissions::from_mode(0o644)).unwrap();
        fixture.settings.python_path = Some(not_executable);
        assert_eq!(aborted_code(fixture.orchestrator(&mock).run().await), "interpreter_missing");

        assert_eq!(mock.call_count(), 0);
        fixture.assert_released();
    }

    #[tokio::test]
    async fn requirements_and_pip_are_checked_before_install() {
        let mut fixture = Fixture::new();
        let mock = happy_mock();

        fixture.settings.pip_path = None;
        assert_eq!(aborted_code(fixture.orchestrator(&mock).run().await), "pip_missing");

        fixture.settings.requirements_path = fixture.dir.path().join("missing.txt");
        assert_eq!(
            aborted_code(fixture.orchestrator(&mock).run().await),
            "requirements_missing"
        );

        assert_eq!(mock.call_count(), 0);
        fixture.assert_released();
    }

    #[tokio::test]
    async fn failed_install_aborts_before_scraping() {
        let fixture = Fixture::new();
        let mock = Arc::new(
            MockStrategy::available()
                .with_response("install -r", "ERROR: No matching distribution", 1)
                .with_response("scraper.py", SCRAPER_OUTPUT, 0),
        );

        assert_eq!(
            aborted_code(fixture.orchestrator(&mock).run().await),
            "dependency_install_failed"
        );
        assert_eq!(mock.call_count(), 1);
        fixture.assert_released();
    }

    #[tokio::test]
    async fn unreachable_registry_aborts() {
        let fixture = Fixture::new();
        let mock = happy_mock();
        let orchestrator = ScrapeOrchestrator::new(
            fixture.settings.clone(),
            CommandRunner::new(vec![mock.clone() as Arc<dyn ExecStrategy>]),
            fixture.store(),
            Arc::new(DownRegistry),
            fixture.lock.clone(),
        );

        assert_eq!(aborted_code(orchestrator.run().await), "database_unreachable");
        fixture.assert_released();
    }

    #[tokio::test]
    async fn empty_or_invalid_user_list_aborts() {
        let fixture = Fixture::new();
        fixture.registry.remove_user("abcDEF123").unwrap();
        let mock = happy_mock();

        assert_eq!(aborted_code(fixture.orchestrator(&mock).run().await), "no_scholar_users");
        assert_eq!(mock.call_count(), 1);
        fixture.assert_released();
    }

    #[tokio::test]
    async fn non_zero_exit_leaves_cache_untouched() {
        let fixture = Fixture::new();
        let store = fixture.store();
        store.write_raw("[]").unwrap();
        store.write_serialized("[]").unwrap();

        let mock = Arc::new(
            MockStrategy::available()
                .with_response("install -r", "", 0)
                .with_response("scraper.py", "Traceback (most recent call last)", 1),
        );

        let outcome = fixture.orchestrator(&mock).run().await;
        assert!(matches!(
            outcome,
            ScrapeOutcome::Aborted(ScrapeError::NonZeroExit { status: 1, .. })
        ));
        assert_eq!(std::fs::read_to_string(store.raw_path()).unwrap(), "[]");
        assert_eq!(std::fs::read_to_string(store.serialized_path()).unwrap(), "[]");
        fixture.assert_released();
    }

    #[tokio::test]
    async fn undecodable_output_keeps_previous_cache() {
        let fixture = Fixture::new();
        let store = fixture.store();
        store.write_raw("previous raw").unwrap();
        store.write_serialized("previous serialized").unwrap();

        let mock = Arc::new(
            MockStrategy::available()
                .with_response("install -r", "", 0)
                .with_response("scraper.py", "rate limited, try later", 0),
        );

        let orchestrator = fixture.orchestrator(&mock);
        let outcome = orchestrator.run().await;
        assert!(matches!(outcome, ScrapeOutcome::Aborted(ScrapeError::Decode(_))));
        assert_eq!(std::fs::read_to_string(store.raw_path()).unwrap(), "previous raw");
        assert_eq!(
            std::fs::read_to_string(store.serialized_path()).unwrap(),
            "previous serialized"
        );
        assert_eq!(orchestrator.state(), ScrapeState::Idle);
        fixture.assert_released();
    }

    #[tokio::test]
    async fn unavailable_tooling_aborts() {
        let fixture = Fixture::new();
        let mock = Arc::new(MockStrategy::unavailable());

        let outcome = fixture.orchestrator(&mock).run().await;
        assert!(matches!(
            outcome,
            ScrapeOutcome::Aborted(ScrapeError::Exec(ExecError::ToolingUnavailable))
        ));
        fixture.assert_released();
    }

    #[test]
    fn scrape_command_quotes_paths() {
        let command = build_scrape_command(
            Path::new("/usr/bin/python3"),
            Path::new("/srv/my scraper/scraper.py"),
            &["a1".to_string(), "b-2".to_string()],
        );
        assert_eq!(
            command,
            "/usr/bin/python3 '/srv/my scraper/scraper.py' a1 b-2 2>&1"
        );
    }
}
