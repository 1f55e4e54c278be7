//! Backend port: where build records for patches are kept.
//!
//! The orchestrator only sees the [`Backend`] trait. Two adapters ship with
//! the crate:
//! - [`MemoryBackend`]: mutex-guarded maps, lost on restart
//! - [`FileBackend`]: append-only JSON Lines log replayed on open
//!
//! Both enforce one build record per patch and are safe to share between
//! dispatch workers.

mod log;
mod memory;

use std::io;

use thiserror::Error;

use crate::types::{BuildNumber, Patch, PatchBuild};

pub use log::{BuildRecord, FileBackend};
pub use memory::MemoryBackend;

/// Errors returned by backend adapters.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A build is already recorded for this patch.
    #[error("patch {patch} already has build {existing}")]
    DuplicatePatch {
        patch: Patch,
        existing: BuildNumber,
    },

    /// IO error from a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Record (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A lock guarding shared state was poisoned by a panicking writer.
    #[error("backend state poisoned")]
    Poisoned,
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Persists and looks up the build associated with a patch.
///
/// Implementations must be safe under concurrent use: the SSH event stream
/// and a webhook stream may dispatch into the same backend at once.
pub trait Backend: Send + Sync {
    /// Records a newly created build. Fails with
    /// [`BackendError::DuplicatePatch`] if the patch already has one.
    fn save_build(&self, build: &PatchBuild) -> Result<()>;

    /// Looks up a build by its number. `Ok(None)` if unknown.
    fn get_build(&self, build_number: BuildNumber) -> Result<Option<PatchBuild>>;

    /// Looks up the build recorded for a patch. `Ok(None)` if no build is on
    /// record, which is not an error.
    fn get_patch(&self, patch: &Patch) -> Result<Option<PatchBuild>>;
}
