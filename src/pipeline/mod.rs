//! Pipeline port: how the relay asks the CI system for builds.
//!
//! Handlers depend only on [`BuildPipeline`]. The network client for a real
//! CI service lives outside this crate; [`DryRunPipeline`] stands in for it
//! when rehearsing against a live event stream.

mod dry_run;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{BuildNumber, Event};

pub use dry_run::DryRunPipeline;

/// Environment variable carrying the change number into the build.
pub const ENV_CHANGE_NUMBER: &str = "REVIEW_CHANGE_NUMBER";

/// Environment variable carrying the patchset number into the build.
pub const ENV_PATCHSET_NUMBER: &str = "REVIEW_PATCHSET_NUMBER";

/// Environment variable carrying the fetchable ref into the build.
pub const ENV_REF: &str = "REVIEW_REF";

/// Errors returned by pipeline adapters.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The CI system refused or failed to create the build.
    #[error("failed to create build for {commit}: {reason}")]
    CreateFailed { commit: String, reason: String },

    /// The CI system refused or failed to cancel the build.
    #[error("failed to cancel build {build}: {reason}")]
    CancelFailed { build: BuildNumber, reason: String },

    /// The CI system could not be reached.
    #[error("pipeline unavailable: {0}")]
    Unavailable(String),
}

/// What to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Commit to build.
    pub commit: String,

    /// Branch or ref the commit is reachable from.
    pub branch: String,

    /// Human-readable build title.
    pub message: String,

    /// Extra environment for the build.
    pub env: BTreeMap<String, String>,
}

impl BuildRequest {
    /// Builds the request for the patchset an event refers to.
    pub fn for_patchset(event: &Event) -> Self {
        let change = event.change.number;
        let patch_set = &event.patch_set;

        let env = BTreeMap::from([
            (ENV_CHANGE_NUMBER.to_string(), change.to_string()),
            (ENV_PATCHSET_NUMBER.to_string(), patch_set.number.to_string()),
            (ENV_REF.to_string(), patch_set.git_ref.clone()),
        ]);

        BuildRequest {
            commit: patch_set.revision.clone(),
            branch: patch_set.git_ref.clone(),
            message: format!("Change {} patchset {}", change, patch_set.number),
            env,
        }
    }

    /// Builds the request for a branch tip.
    pub fn for_branch(branch: &str, commit: &str) -> Self {
        BuildRequest {
            commit: commit.to_string(),
            branch: branch.to_string(),
            message: format!("Branch {} at {}", branch, short_rev(commit)),
            env: BTreeMap::new(),
        }
    }
}

fn short_rev(rev: &str) -> &str {
    rev.get(..7).unwrap_or(rev)
}

/// Creates and cancels builds in the CI system.
///
/// Calls are synchronous and may block on network I/O.
pub trait BuildPipeline: Send + Sync {
    /// Creates a build and returns the number the CI system assigned to it.
    fn create_build(&self, request: &BuildRequest) -> Result<BuildNumber, PipelineError>;

    /// Cancels a build previously returned by [`create_build`](Self::create_build).
    fn cancel_build(&self, build: BuildNumber) -> Result<(), PipelineError>;
}
