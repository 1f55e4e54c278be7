//! Build records keyed by (change, patchset).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{BuildNumber, ChangeNumber, PatchSetNumber};

/// Identity of one patchset of one change, used as the backend lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Patch {
    pub change: ChangeNumber,
    pub patch_set: PatchSetNumber,
}

impl Patch {
    pub fn new(change: ChangeNumber, patch_set: PatchSetNumber) -> Self {
        Patch { change, patch_set }
    }

    /// The patch for the patchset immediately before this one, if any.
    pub fn previous(&self) -> Option<Patch> {
        self.patch_set
            .previous()
            .map(|patch_set| Patch::new(self.change, patch_set))
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.change, self.patch_set)
    }
}

/// A CI build created for a patch.
///
/// Created right after the pipeline accepts the build and never mutated
/// afterwards: a new patchset gets a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchBuild {
    pub build_number: BuildNumber,
    pub patch: Patch,
}

impl PatchBuild {
    pub fn new(build_number: BuildNumber, patch: Patch) -> Self {
        PatchBuild {
            build_number,
            patch,
        }
    }
}
