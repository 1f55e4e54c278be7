//! In-memory backend.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{BuildNumber, Patch, PatchBuild};

use super::{Backend, BackendError, Result};

#[derive(Debug, Default)]
struct Index {
    by_patch: HashMap<Patch, PatchBuild>,
    by_build: HashMap<BuildNumber, Patch>,
}

impl Index {
    fn insert(&mut self, build: &PatchBuild) -> Result<()> {
        if let Some(existing) = self.by_patch.get(&build.patch) {
            return Err(BackendError::DuplicatePatch {
                patch: build.patch,
                existing: existing.build_number,
            });
        }
        self.by_patch.insert(build.patch, build.clone());
        self.by_build.insert(build.build_number, build.patch);
        Ok(())
    }

    fn get_build(&self, build_number: BuildNumber) -> Option<PatchBuild> {
        self.by_build
            .get(&build_number)
            .and_then(|patch| self.by_patch.get(patch))
            .cloned()
    }

    fn get_patch(&self, patch: &Patch) -> Option<PatchBuild> {
        self.by_patch.get(patch).cloned()
    }
}

/// A backend that keeps build records in process memory.
///
/// Records are lost on restart, so a restarted relay will not cancel builds
/// for patchsets it saw before the restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    index: Mutex<Index>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of build records held.
    pub fn len(&self) -> usize {
        self.index
            .lock()
            .map(|index| index.by_patch.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_index<T>(&self, f: impl FnOnce(&mut Index) -> Result<T>) -> Result<T> {
        let mut index = self.index.lock().map_err(|_| BackendError::Poisoned)?;
        f(&mut index)
    }
}

impl Backend for MemoryBackend {
    fn save_build(&self, build: &PatchBuild) -> Result<()> {
        self.with_index(|index| index.insert(build))
    }

    fn get_build(&self, build_number: BuildNumber) -> Result<Option<PatchBuild>> {
        self.with_index(|index| Ok(index.get_build(build_number)))
    }

    fn get_patch(&self, patch: &Patch) -> Result<Option<PatchBuild>> {
        self.with_index(|index| Ok(index.get_patch(patch)))
    }
}
