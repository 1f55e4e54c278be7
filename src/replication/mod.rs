//! Mirroring review refs to a second git server.
//!
//! [`SshReplicator::replicate`] copies whatever commit a source ref points to
//! onto a destination ref, using plain `git` subprocesses:
//!
//! 1. clone the source (or reuse an existing clone of it)
//! 2. `git fetch origin <src_ref>`
//! 3. `git reset --hard FETCH_HEAD`
//! 4. `git push --force <dest> HEAD:<dest_ref>`
//!
//! Any failure aborts the remaining steps, so a failure before the push never
//! touches the destination. Source and destination each get their own
//! `GIT_SSH_COMMAND`; credentials never leak from one side to the other.
//!
//! # Clone location
//!
//! With [`CloneLocation::Temporary`] every call clones into a fresh directory
//! that is removed when the call returns, whatever the outcome. With
//! [`CloneLocation::Persistent`] the clone outlives the call and later calls
//! reuse it; calls on one replicator are then serialized.

mod git;
mod remote;


use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::backend::Backend;
use crate::pipeline::BuildPipeline;
use crate::router::HandlerError;
use crate::types::{ChangeNumber, Event};

use git::{git_command, is_existing_clone_message, run_step};

pub use remote::GitSshRemote;

/// The git steps of one replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationStep {
    Clone,
    Fetch,
    Reset,
    Push,
}

impl fmt::Display for ReplicationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicationStep::Clone => "clone",
            ReplicationStep::Fetch => "fetch",
            ReplicationStep::Reset => "reset",
            ReplicationStep::Push => "push",
        };
        f.write_str(name)
    }
}

/// Errors from replication.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The temporary workspace could not be created.
    #[error("failed to create replication workspace: {0}")]
    Workspace(#[source] io::Error),

    /// git could not be launched.
    #[error("{step} failed to start ({command}): {source}")]
    Spawn {
        step: ReplicationStep,
        command: String,
        #[source]
        source: io::Error,
    },

    /// git ran and exited unsuccessfully.
    #[error("{step} failed ({command}), exit code {exit_code:?}: {stderr}")]
    StepFailed {
        step: ReplicationStep,
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The clone target is populated and reuse is disabled.
    #[error("clone target {path} already exists and reuse is disabled")]
    CloneExists { path: PathBuf },

    /// The clone directory could not be inspected or entered.
    #[error("clone directory {path} is unusable: {source}")]
    CloneDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An existing clone tracks a different repository.
    #[error("clone at {path} tracks {actual}, expected {expected}")]
    ForeignClone {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl ReplicationError {
    /// The step that failed, if the failure came from git itself.
    pub fn step(&self) -> Option<ReplicationStep> {
        match self {
            ReplicationError::Spawn { step, .. } | ReplicationError::StepFailed { step, .. } => {
                Some(*step)
            }
            _ => None,
        }
    }

    fn is_existing_clone(&self) -> bool {
        matches!(
            self,
            ReplicationError::StepFailed { step: ReplicationStep::Clone, stderr, .. }
                if is_existing_clone_message(stderr)
        )
    }
}

/// Result type for replication.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Where the working clone lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneLocation {
    /// A fresh directory per call, removed when the call returns. `None`
    /// uses the system temp directory.
    Temporary { parent: Option<PathBuf> },

    /// A long-lived clone at this path, reused across calls.
    Persistent(PathBuf),
}

impl Default for CloneLocation {
    fn default() -> Self {
        CloneLocation::Temporary { parent: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatorConfig {
    pub clone_location: CloneLocation,

    /// Continue with an already-populated clone target instead of failing.
    pub reuse_existing_clone: bool,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        ReplicatorConfig {
            clone_location: CloneLocation::default(),
            reuse_existing_clone: true,
        }
    }
}

/// How the working clone was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    Reused,
}

/// Copies a ref from one repository to another.
pub trait ChangeReplicator: Send + Sync {
    /// Makes `dest_ref` on the destination point at the commit `src_ref`
    /// points at on the source.
    fn replicate(&self, src_ref: &str, dest_ref: &str) -> Result<CloneOutcome>;
}

/// Replicates by shelling out to `git` over SSH.
#[derive(Debug)]
pub struct SshReplicator {
    source: GitSshRemote,
    destination: GitSshRemote,
    config: ReplicatorConfig,
    /// Held for the whole call when the clone is persistent.
    clone_lock: Mutex<()>,
}

/// The directory a single call works in.
enum Workspace {
    /// Removed on drop.
    Temporary(TempDir),
    Persistent(PathBuf),
}

impl Workspace {
    fn clone_dir(&self) -> PathBuf {
        match self {
            Workspace::Temporary(dir) => dir.path().join("clone"),
            Workspace::Persistent(path) => path.clone(),
        }
    }
}

impl SshReplicator {
    pub fn new(source: GitSshRemote, destination: GitSshRemote, config: ReplicatorConfig) -> Self {
        SshReplicator {
            source,
            destination,
            config,
            clone_lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &GitSshRemote {
        &self.source
    }

    pub fn destination(&self) -> &GitSshRemote {
        &self.destination
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    fn workspace(&self) -> Result<Workspace> {
        match &self.config.clone_location {
            CloneLocation::Temporary { parent } => {
                let mut builder = tempfile::Builder::new();
                builder.prefix("relay-replicate-");
                let dir = match parent {
                    Some(parent) => {
                        fs::create_dir_all(parent).map_err(ReplicationError::Workspace)?;
                        builder.tempdir_in(parent)
                    }
                    None => builder.tempdir(),
                }
                .map_err(ReplicationError::Workspace)?;
                Ok(Workspace::Temporary(dir))
            }
            CloneLocation::Persistent(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).map_err(ReplicationError::Workspace)?;
                }
                Ok(Workspace::Persistent(path.clone()))
            }
        }
    }

    /// Clones the source into `target`, or accepts an existing clone.
    /// Clones into `target` unless `populated` says it already holds one.
    fn clone_source(&self, target: &Path, populated: bool) -> Result<CloneOutcome> {
        if populated {
            return self.accept_existing_clone(target);
        }

        let workdir = target.parent().unwrap_or(Path::new("."));
        let mut cmd = git_command(workdir);
        cmd.arg("clone")
            .arg(&self.source.url)
            .arg(target)
            .env("GIT_SSH_COMMAND", self.source.ssh_command());

        match run_step(ReplicationStep::Clone, cmd) {
            Ok(_) => Ok(CloneOutcome::Cloned),
            // Populated between the check and the clone.
            Err(e) if e.is_existing_clone() => self.accept_existing_clone(target),
            Err(e) => Err(e),
        }
    }

    fn accept_existing_clone(&self, target: &Path) -> Result<CloneOutcome> {
        if !self.config.reuse_existing_clone {
            error!(path = %target.display(), "Clone target already exists and reuse is disabled");
            return Err(ReplicationError::CloneExists {
                path: target.to_path_buf(),
            });
        }

        warn!(path = %target.display(), "Clone target already exists, reusing it");
        self.verify_origin(target)?;
        Ok(CloneOutcome::Reused)
    }

    fn verify_origin(&self, clone_dir: &Path) -> Result<()> {
        let mut cmd = git_command(clone_dir);
        cmd.args(["remote", "get-url", "origin"]);
        let output = run_step(ReplicationStep::Clone, cmd)?;

        let actual = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !same_remote(&actual, &self.source.url) {
            return Err(ReplicationError::ForeignClone {
                path: clone_dir.to_path_buf(),
                expected: self.source.url.clone(),
                actual,
            });
        }
        Ok(())
    }

    fn fetch(&self, clone_dir: &Path, src_ref: &str) -> Result<()> {
        let mut cmd = git_command(clone_dir);
        cmd.args(["fetch", "origin", src_ref])
            .env("GIT_SSH_COMMAND", self.source.ssh_command());
        run_step(ReplicationStep::Fetch, cmd)?;
        Ok(())
    }

    fn reset(&self, clone_dir: &Path) -> Result<()> {
        let mut cmd = git_command(clone_dir);
        cmd.args(["reset", "--hard", "FETCH_HEAD"]);
        run_step(ReplicationStep::Reset, cmd)?;
        Ok(())
    }

    fn push(&self, clone_dir: &Path, dest_ref: &str) -> Result<()> {
        let mut cmd = git_command(clone_dir);
        cmd.args(["push", "--force"])
            .arg(&self.destination.url)
            .arg(format!("HEAD:{}", qualify_dest_ref(dest_ref)))
            .env("GIT_SSH_COMMAND", self.destination.ssh_command());
        run_step(ReplicationStep::Push, cmd)?;
        Ok(())
    }

    /// Runs one replication, deciding whether the clone target already holds
    /// a clone with `is_populated`.
    pub(crate) fn replicate_with<F>(
        &self,
        src_ref: &str,
        dest_ref: &str,
        is_populated: F,
    ) -> Result<CloneOutcome>
    where
        F: Fn(&Path) -> Result<bool>,
    {
        let _guard = match self.config.clone_location {
            CloneLocation::Persistent(_) => {
                Some(self.clone_lock.lock().unwrap_or_else(|e| e.into_inner()))
            }
            CloneLocation::Temporary { .. } => None,
        };

        let workspace = self.workspace()?;
        let clone_dir = workspace.clone_dir();

        let populated = is_populated(&clone_dir)?;
        let outcome = self.clone_source(&clone_dir, populated)?;
        enter(&clone_dir)?;
        self.fetch(&clone_dir, src_ref)?;
        self.reset(&clone_dir)?;
        self.push(&clone_dir, dest_ref)?;

        info!(?outcome, "Replicated ref");
        Ok(outcome)
    }
}

impl ChangeReplicator for SshReplicator {
    #[instrument(skip(self), fields(source = %self.source, destination = %self.destination))]
    fn replicate(&self, src_ref: &str, dest_ref: &str) -> Result<CloneOutcome> {
        self.replicate_with(src_ref, dest_ref, is_populated)
    }
}

/// Returns true if `path` exists and has entries.
fn is_populated(path: &Path) -> Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ReplicationError::CloneDir {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// git records local clone sources as absolute paths, so paths are compared
/// after resolving them.
fn same_remote(actual: &str, expected: &str) -> bool {
    if actual == expected {
        return true;
    }
    match (fs::canonicalize(actual), fs::canonicalize(expected)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Checks that the clone directory is a directory git can run in.
fn enter(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|source| ReplicationError::CloneDir {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(ReplicationError::CloneDir {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        });
    }
    Ok(())
}

/// `refs/...` is pushed as given; anything else names a branch.
pub fn qualify_dest_ref(dest_ref: &str) -> String {
    if dest_ref.starts_with("refs/") {
        dest_ref.to_string()
    } else {
        format!("refs/heads/{}", dest_ref)
    }
}

/// Destination branch for a change.
pub fn change_branch(change: ChangeNumber) -> String {
    format!("change-{}", change)
}

/// Handler name for patchset replication.
pub const REPLICATION_HANDLER: &str = "replicate";

/// Builds a `patchset-created` handler that mirrors the patchset's ref to
/// `change-<number>` on the destination.
pub fn replication_handler(
    replicator: Arc<dyn ChangeReplicator>,
) -> impl Fn(&Event, &dyn BuildPipeline, &dyn Backend) -> std::result::Result<(), HandlerError>
+ Send
+ Sync
+ 'static {
    move |event: &Event, _: &dyn BuildPipeline, _: &dyn Backend| {
        let src_ref = event.patch_set.git_ref.as_str();
        if src_ref.is_empty() {
            return Err(HandlerError::InvalidEvent(format!(
                "patchset {} of change {} has no ref",
                event.patch_set.number, event.change.number
            )));
        }

        let dest_ref = change_branch(event.change.number);
        replicator.replicate(src_ref, &dest_ref)?;
        Ok(())
    }
}
