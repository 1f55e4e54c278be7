//! Shared test doubles, fixtures and arbitrary generators.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use proptest::prelude::*;

use crate::backend::{Backend, BackendError};
use crate::pipeline::{BuildPipeline, BuildRequest, PipelineError};
use crate::types::{BuildNumber, ChangeNumber, Event, Patch, PatchBuild, PatchSet, PatchSetNumber};

/// Pipeline double that counts calls and can be told to fail.
#[derive(Debug)]
pub struct MockPipeline {
    next_build: AtomicU64,
    created: Mutex<Vec<BuildRequest>>,
    cancelled: Mutex<Vec<BuildNumber>>,
    fail_create: bool,
    fail_cancel: bool,
}

impl MockPipeline {
    /// A pipeline whose builds are numbered from 1.
    pub fn new() -> Self {
        MockPipeline {
            next_build: AtomicU64::new(1),
            created: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_create: false,
            fail_cancel: false,
        }
    }

    pub fn with_first_build(self, first: BuildNumber) -> Self {
        self.next_build.store(first.0, Ordering::SeqCst);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    /// Number of `create_build` calls, including failed ones.
    pub fn create_calls(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Number of `cancel_build` calls, including failed ones.
    pub fn cancel_calls(&self) -> usize {
        self.cancelled.lock().unwrap().len()
    }

    pub fn created(&self) -> Vec<BuildRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<BuildNumber> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl Default for MockPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildPipeline for MockPipeline {
    fn create_build(&self, request: &BuildRequest) -> Result<BuildNumber, PipelineError> {
        self.created.lock().unwrap().push(request.clone());
        if self.fail_create {
            return Err(PipelineError::CreateFailed {
                commit: request.commit.clone(),
                reason: "mock failure".to_string(),
            });
        }
        Ok(BuildNumber(self.next_build.fetch_add(1, Ordering::SeqCst)))
    }

    fn cancel_build(&self, build: BuildNumber) -> Result<(), PipelineError> {
        self.cancelled.lock().unwrap().push(build);
        if self.fail_cancel {
            return Err(PipelineError::CancelFailed {
                build,
                reason: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Backend double that records calls and can be seeded with prior builds.
#[derive(Debug, Default)]
pub struct MockBackend {
    builds: Mutex<HashMap<Patch, PatchBuild>>,
    saved: Mutex<Vec<PatchBuild>>,
    lookups: Mutex<Vec<Patch>>,
    fail_save: bool,
    fail_lookup: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a build as if it had been saved earlier. Not counted as a save.
    pub fn with_build(self, build: PatchBuild) -> Self {
        self.builds.lock().unwrap().insert(build.patch, build);
        self
    }

    pub fn failing_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    pub fn failing_lookup(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    pub fn save_calls(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    /// Number of `get_patch` calls.
    pub fn lookup_calls(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }

    pub fn saved(&self) -> Vec<PatchBuild> {
        self.saved.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> Vec<Patch> {
        self.lookups.lock().unwrap().clone()
    }
}

fn mock_io_error() -> BackendError {
    BackendError::Io(std::io::Error::other("mock failure"))
}

impl Backend for MockBackend {
    fn save_build(&self, build: &PatchBuild) -> Result<(), BackendError> {
        self.saved.lock().unwrap().push(build.clone());
        if self.fail_save {
            return Err(mock_io_error());
        }
        self.builds.lock().unwrap().insert(build.patch, build.clone());
        Ok(())
    }

    fn get_build(&self, build_number: BuildNumber) -> Result<Option<PatchBuild>, BackendError> {
        Ok(self
            .builds
            .lock()
            .unwrap()
            .values()
            .find(|b| b.build_number == build_number)
            .cloned())
    }

    fn get_patch(&self, patch: &Patch) -> Result<Option<PatchBuild>, BackendError> {
        self.lookups.lock().unwrap().push(*patch);
        if self.fail_lookup {
            return Err(mock_io_error());
        }
        Ok(self.builds.lock().unwrap().get(patch).cloned())
    }
}

/// A patchset with a ref and revision derived from its numbers.
pub fn patch_set(change: u64, number: u64) -> PatchSet {
    PatchSet {
        number: PatchSetNumber(number),
        revision: format!("{:040x}", change * 1000 + number),
        git_ref: format!("refs/changes/{:02}/{}/{}", change % 100, change, number),
    }
}

pub fn patchset_created(change: u64, number: u64) -> Event {
    Event::patchset_created(ChangeNumber(change), patch_set(change, number))
}

pub fn comment_added(change: u64, number: u64, comment: &str) -> Event {
    Event::comment_added(ChangeNumber(change), patch_set(change, number), comment)
}

pub fn arb_change_number() -> impl Strategy<Value = u64> {
    1u64..1_000_000
}

pub fn arb_patchset_number() -> impl Strategy<Value = u64> {
    1u64..500
}

/// A comment line that is never exactly `retest`.
pub fn arb_non_retest_line() -> impl Strategy<Value = String> {
    "[ -~\t]{0,40}".prop_filter("must not be the retest token", |line| line != "retest")
}
