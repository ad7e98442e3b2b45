//! Command runner: executes external processes through a prioritized list
//! of exec strategies.
//!
//! The runner walks its strategies in order, skips those that are not
//! available, and returns the result of the first one that manages to run
//! the command. A non-zero exit status is still a result; only spawn
//! failures fall through to the next strategy. When nothing can run the
//! command the runner reports `ExecError::ToolingUnavailable`.

mod mock;
mod strategies;
mod traits;

pub use mock::MockStrategy;
pub use strategies::{DirectExec, PipeExec, ShellExec};
pub use traits::{CommandOutput, ExecError, ExecStrategy};

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs command lines through the first usable exec strategy.
#[derive(Clone)]
pub struct CommandRunner {
    strategies: Vec<Arc<dyn ExecStrategy>>,
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Create a runner over the given strategies, in preference order.
    pub fn new(strategies: Vec<Arc<dyn ExecStrategy>>) -> Self {
        Self {
            strategies,
            timeout: None,
        }
    }

    /// Buffered shell, then direct spawn, then streamed pipe.
    pub fn with_default_strategies() -> Self {
        Self::new(vec![
            Arc::new(ShellExec::new()),
            Arc::new(DirectExec::new()),
            Arc::new(PipeExec::new()),
        ])
    }

    /// Bound every execution. `None` lets commands run indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drop strategies the host forbids, matched by name.
    pub fn without(mut self, disabled: &[String]) -> Self {
        self.strategies
            .retain(|s| !disabled.iter().any(|name| name.eq_ignore_ascii_case(s.name())));
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Execute `command`, returning its combined output and exit status.
    pub async fn run(&self, command: &str) -> Result<CommandOutput, ExecError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        for strategy in &self.strategies {
            if !strategy.is_available() {
                debug!(strategy = strategy.name(), "exec strategy unavailable");
                continue;
            }

            debug!(strategy = strategy.name(), command, "running command");
            let attempt = match self.timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, strategy.execute(command)).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(strategy = strategy.name(), ?limit, "command timed out");
                            return Err(ExecError::TimedOut(limit));
                        }
                    }
                }
                None => strategy.execute(command).await,
            };

            match attempt {
                Ok(output) => {
                    debug!(
                        strategy = strategy.name(),
                        status = output.status,
                        bytes = output.output.len(),
                        "command finished"
                    );
                    return Ok(output);
                }
                Err(e @ ExecError::Spawn { .. }) => {
                    warn!(error = %e, "exec strategy failed, trying next");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ExecError::ToolingUnavailable)
    }
}

/// Append the stderr-to-stdout redirection unless already present.
pub fn merge_stderr(command: &str) -> String {
    let trimmed = command.trim_end();
    if trimmed.ends_with("2>&1") {
        trimmed.to_string()
    } else {
        format!("{} 2>&1", trimmed)
    }
}

/// Quote an argument for `sh` when it contains anything beyond a safe set.
pub fn shell_quote(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,".contains(c));
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

/// Split a command line into words, honoring single and double quotes and
/// backslash escapes outside single quotes.
pub fn split_command_line(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => current.push(c),
            (Some('"'), '"') => quote = None,
            (_, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (Some(_), _) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, _) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(current);
    }
    words
}
