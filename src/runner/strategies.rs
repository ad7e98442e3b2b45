//! Process-backed exec strategies
//!
//! - `ShellExec`: hand the whole line to `sh -c` and buffer its output
//! - `DirectExec`: tokenize the line and spawn the program without a shell
//! - `PipeExec`: `sh -c` with stdout streamed line by line
//!
//! Every child leads its own process group. If the call is dropped before
//! the child exits (a timeout), the whole group is killed, so programs the
//! shell started die with it.

use super::split_command_line;
use super::traits::{CommandOutput, ExecError, ExecStrategy};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace, warn};

const DEFAULT_SHELL: &str = "/bin/sh";

/// Redirection token that merges stderr into stdout
const MERGE_STDERR: &str = "2>&1";

/// Kills the child's process group on drop unless disarmed.
struct GroupKill {
    pgid: Option<u32>,
}

impl GroupKill {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    /// The group exited on its own.
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid else { return };
        if !cfg!(unix) {
            return;
        }
        let status = std::process::Command::new(DEFAULT_SHELL)
            .arg("-c")
            .arg(format!("kill -s KILL -- -{} 2>/dev/null", pgid))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => debug!(pgid, "killed process group"),
            Ok(_) => debug!(pgid, "process group already gone"),
            Err(e) => warn!(pgid, error = %e, "failed to kill process group"),
        }
    }
}

/// Base command: null stdin, killed on drop, leader of a new process group.
fn base_command(program: impl AsRef<std::ffi::OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Spawn with both streams captured and wait for exit, killing the group
/// if dropped first.
async fn run_buffered(mut cmd: Command, name: &str) -> Result<std::process::Output, ExecError> {
    let child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExecError::spawn(name, e))?;

    let mut group = GroupKill::new(child.id());
    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ExecError::spawn(name, e))?;
    group.disarm();
    Ok(output)
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(stderr));
    text
}

/// Buffered execution through the system shell.
#[derive(Debug, Clone)]
pub struct ShellExec {
    shell: PathBuf,
}

impl ShellExec {
    pub fn new() -> Self {
        Self::with_shell(DEFAULT_SHELL)
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellExec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecStrategy for ShellExec {
    fn name(&self) -> &str {
        "shell"
    }

    fn is_available(&self) -> bool {
        self.shell.is_file()
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        let mut cmd = base_command(&self.shell);
        cmd.arg("-c").arg(command);
        let output = run_buffered(cmd, self.name()).await?;

        Ok(CommandOutput::new(
            combine(&output.stdout, &output.stderr),
            exit_code(output.status),
        ))
    }
}

/// Spawns the program directly, without a shell.
///
/// The `2>&1` token is honored by appending captured stderr to stdout;
/// any other shell syntax is passed through as literal arguments.
#[derive(Debug, Clone, Default)]
pub struct DirectExec;

impl DirectExec {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecStrategy for DirectExec {
    fn name(&self) -> &str {
        "direct"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        let mut tokens = split_command_line(command);
        let merge = tokens.iter().any(|t| t == MERGE_STDERR);
        tokens.retain(|t| t != MERGE_STDERR);

        let (program, args) = tokens.split_first().ok_or(ExecError::EmptyCommand)?;

        let mut cmd = base_command(program);
        cmd.args(args);
        let output = run_buffered(cmd, self.name()).await?;

        let text = if merge {
            combine(&output.stdout, &output.stderr)
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };

        Ok(CommandOutput::new(text, exit_code(output.status)))
    }
}

/// Streams stdout of `sh -c` line by line, the way a pipe opened on the
/// command would. Stderr is only captured through redirection.
#[derive(Debug, Clone)]
pub struct PipeExec {
    shell: PathBuf,
}

impl PipeExec {
    pub fn new() -> Self {
        Self::with_shell(DEFAULT_SHELL)
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for PipeExec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecStrategy for PipeExec {
    fn name(&self) -> &str {
        "pipe"
    }

    fn is_available(&self) -> bool {
        self.shell.is_file()
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, ExecError> {
        let mut child = base_command(&self.shell)
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExecError::spawn(self.name(), e))?;
        let mut group = GroupKill::new(child.id());

        let stdout = child.stdout.take().ok_or_else(|| {
            ExecError::spawn(
                self.name(),
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured"),
            )
        })?;

        let mut lines = BufReader::new(stdout).lines();
        let mut output = String::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ExecError::spawn(self.name(), e))?
        {
            trace!(%line, "command output");
            output.push_str(&line);
            output.push('\n');
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ExecError::spawn(self.name(), e))?;
        group.disarm();

        Ok(CommandOutput::new(output, exit_code(status)))
    }
}
