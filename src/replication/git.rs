//! Git subprocess plumbing for the replicator.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};

use tracing::debug;

use super::{ReplicationError, ReplicationStep};

/// Suffix git prints when the clone target is already populated.
const EXISTING_CLONE_SUFFIX: &str = "already exists and is not an empty directory.";

/// Creates a git command with a clean environment, running in `workdir`.
///
/// System and user config are ignored and terminal prompts are disabled, so a
/// missing credential fails the step instead of blocking on stdin.
pub(crate) fn git_command(workdir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd
}

/// Renders a command as `git arg arg ...` for logs and errors.
pub(crate) fn command_line(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs one step, mapping a launch failure or non-zero exit to an error.
pub(crate) fn run_step(
    step: ReplicationStep,
    mut cmd: Command,
) -> Result<Output, ReplicationError> {
    let command = command_line(&cmd);
    debug!(%step, %command, "Running git");

    let output = cmd.output().map_err(|source| ReplicationError::Spawn {
        step,
        command: command.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(ReplicationError::StepFailed {
            step,
            command,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

/// Returns true if `stderr` reports a populated clone target.
pub(crate) fn is_existing_clone_message(stderr: &str) -> bool {
    stderr
        .lines()
        .any(|line| line.trim_end().ends_with(EXISTING_CLONE_SUFFIX))
}
