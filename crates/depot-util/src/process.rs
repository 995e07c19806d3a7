//! Process execution for external package-manager commands.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::UtilError;

/// Structured output from a command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output as a string.
    pub stdout: String,
    /// Standard error as a string.
    pub stderr: String,
    /// Whether the command exited successfully.
    pub success: bool,
    /// The exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
}

/// Runs a program with arguments and captures what it printed.
///
/// The graph builder only ever sees this trait, so tests can feed it canned
/// `go mod graph` output without a Go toolchain.
pub trait CommandRunner: Send + Sync {
    /// # Errors
    /// Returns an error if the program cannot be spawned. A non-zero exit is
    /// reported through `CommandOutput::success`, not as an error.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, UtilError>;
}

/// Runs commands as child processes in a fixed working directory.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    working_dir: PathBuf,
}

impl SystemRunner {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            working_dir: working_dir.to_path_buf(),
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, UtilError> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.working_dir);
        tracing::debug!(program, ?args, dir = %self.working_dir.display(), "running command");
        run_command(&mut cmd)
    }
}

/// Execute a command and capture its output.
///
/// # Errors
/// Returns an error if the command cannot be spawned (e.g. binary not found).
/// A non-zero exit code is **not** an error; check `CommandOutput::success` instead.
pub fn run_command(cmd: &mut Command) -> Result<CommandOutput, UtilError> {
    let output = cmd.output().map_err(|source| UtilError::CommandExec {
        command: cmd.get_program().to_string_lossy().into_owned(),
        source,
    })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        exit_code: output.status.code(),
    })
}
