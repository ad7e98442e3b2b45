//! Exec strategy contract

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Captured output of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout/stderr text
    pub output: String,
    /// Process exit status; -1 when the process was terminated by a signal
    pub status: i32,
}

impl CommandOutput {
    pub fn new(output: impl Into<String>, status: i32) -> Self {
        Self {
            output: output.into(),
            status,
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("no process execution mechanism is available")]
    ToolingUnavailable,

    #[error("empty command line")]
    EmptyCommand,

    #[error("{strategy}: failed to run command: {source}")]
    Spawn {
        strategy: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command timed out after {0:?}")]
    TimedOut(Duration),
}

impl ExecError {
    pub fn spawn(strategy: &str, source: std::io::Error) -> Self {
        Self::Spawn {
            strategy: strategy.to_string(),
            source,
        }
    }
}

/// One way of executing a command line.
///
/// Hosts disable different process primitives, so the runner holds several
/// strategies in preference order and uses the first one that is available.
#[async_trait]
pub trait ExecStrategy: Send + Sync {
    /// Short identifier, matched against `disabled_exec` in the config
    fn name(&self) -> &str;

    /// Whether this mechanism can be used in the current environment.
    fn is_available(&self) -> bool;

    /// Execute the command line and capture its output and exit status.
    ///
    /// Returns `ExecError::Spawn` when the process could not be started or
    /// read, which lets the runner fall through to the next strategy.
    async fn execute(&self, command: &str) -> Result<CommandOutput, ExecError>;
}
