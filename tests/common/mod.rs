//! Common test utilities for scrape integration tests
//!
//! Builds a throwaway installation in a temp dir: a shell script standing in
//! for the Python scraper, `/bin/sh` as its interpreter, and a fake `pip`.

#![allow(dead_code)]

use scholar_scraper::{
    OpenRegistry, ScholarRegistry, ScrapeOrchestrator, ScraperConfig, SqliteRegistry,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Prints one author per id argument, each with a single publication whose
/// citation count is the id's length.
pub const ECHO_SCRAPER: &str = r#"#!/bin/sh
printf '['
sep=''
for id in "$@"; do
  printf '%s{"id":"%s","name":"Scholar %s","publications":[{"title":"Paper by %s","num_citations":%d,"pub_year":"2020"}]}' "$sep" "$id" "$id" "$id" ${#id}
  sep=','
done
printf ']\n'
"#;

pub const FAILING_SCRAPER: &str = "#!/bin/sh\necho 'Traceback: blocked by Google' >&2\nexit 3\n";

pub const GARBAGE_SCRAPER: &str = "#!/bin/sh\necho 'Please show you are not a robot'\n";

pub const SLOW_SCRAPER: &str = "#!/bin/sh\nsleep 30\necho '[]'\n";

pub const PIP_OK: &str = "#!/bin/sh\necho 'Requirement already satisfied'\nexit 0\n";

pub const PIP_FAIL: &str = "#!/bin/sh\necho 'ERROR: Could not find a version' >&2\nexit 1\n";

pub struct Installation {
    pub dir: TempDir,
    pub config: ScraperConfig,
}

impl Installation {
    /// Installation whose scraper is `script` and pip is `pip`
    pub fn new(script: &str, pip: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path();

        let script_path = write_file(root, "scraper.sh", script, 0o644);
        let pip_path = write_file(root, "pip", pip, 0o755);
        let requirements_path = write_file(root, "requirements.txt", "scholarly\n", 0o644);

        let config = ScraperConfig {
            python_path: Some(PathBuf::from("/bin/sh")),
            pip_path: Some(pip_path),
            script_path,
            requirements_path,
            cache_dir: root.join("cache"),
            command_timeout_secs: 10,
            ..ScraperConfig::default()
        };

        Self { dir, config }
    }

    pub fn echo() -> Self {
        Self::new(ECHO_SCRAPER, PIP_OK)
    }

    pub fn registry(&self) -> SqliteRegistry {
        SqliteRegistry::open(self.config.registry_path()).expect("open registry")
    }

    /// Register `ids` in this installation's registry
    pub fn with_users(self, ids: &[&str]) -> Self {
        let registry = self.registry();
        for id in ids {
            registry.add_user(id).expect("add user");
        }
        self
    }

    pub fn orchestrator(&self) -> ScrapeOrchestrator {
        ScrapeOrchestrator::from_config(&self.config, Arc::new(self.registry()))
    }
}

pub fn write_file(dir: &Path, name: &str, content: &str, mode: u32) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write fixture");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).expect("chmod fixture");
    path
}
