//! A pipeline that logs requests instead of calling a CI service.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::types::BuildNumber;

use super::{BuildPipeline, BuildRequest, PipelineError};

/// Hands out increasing build numbers and remembers cancellations.
#[derive(Debug)]
pub struct DryRunPipeline {
    next_build: AtomicU64,
    cancelled: Mutex<Vec<BuildNumber>>,
}

impl DryRunPipeline {
    /// Creates a pipeline whose first build is number 1.
    pub fn new() -> Self {
        Self::starting_at(BuildNumber(1))
    }

    /// Creates a pipeline whose first build gets the given number.
    pub fn starting_at(first: BuildNumber) -> Self {
        DryRunPipeline {
            next_build: AtomicU64::new(first.0),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Builds cancelled so far, in call order.
    pub fn cancelled(&self) -> Vec<BuildNumber> {
        self.cancelled
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl Default for DryRunPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildPipeline for DryRunPipeline {
    fn create_build(&self, request: &BuildRequest) -> Result<BuildNumber, PipelineError> {
        let build = BuildNumber(self.next_build.fetch_add(1, Ordering::Relaxed));
        info!(
            build = %build,
            commit = %request.commit,
            branch = %request.branch,
            message = %request.message,
            "Dry run: would create build"
        );
        Ok(build)
    }

    fn cancel_build(&self, build: BuildNumber) -> Result<(), PipelineError> {
        info!(build = %build, "Dry run: would cancel build");
        self.cancelled
            .lock()
            .map_err(|_| PipelineError::Unavailable("dry-run state poisoned".to_string()))?
            .push(build);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_numbers_increase() {
        let pipeline = DryRunPipeline::starting_at(BuildNumber(40));
        let request = BuildRequest::for_branch("main", "abc");

        assert_eq!(pipeline.create_build(&request).unwrap(), BuildNumber(40));
        assert_eq!(pipeline.create_build(&request).unwrap(), BuildNumber(41));
    }

    #[test]
    fn cancellations_are_recorded_in_order() {
        let pipeline = DryRunPipeline::new();
        pipeline.cancel_build(BuildNumber(3)).unwrap();
        pipeline.cancel_build(BuildNumber(1)).unwrap();
        assert_eq!(pipeline.cancelled(), vec![BuildNumber(3), BuildNumber(1)]);
    }
}
