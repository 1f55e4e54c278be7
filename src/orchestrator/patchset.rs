//! Build a new patchset and cancel the build it supersedes.

use tracing::{debug, error, info, instrument};

use crate::backend::Backend;
use crate::pipeline::{BuildPipeline, BuildRequest};
use crate::router::HandlerError;
use crate::types::{Event, PatchBuild};

/// Handles `patchset-created`.
///
/// 1. Create a build for the patchset. On failure nothing else happens.
/// 2. Record the build. On failure the build is orphaned upstream; the error
///    names the orphaned build and nothing is cancelled.
/// 3. If this is not the first patchset and a build is on record for the
///    immediately preceding patchset, cancel that build.
///
/// Only patchset `N - 1` is ever looked up. Builds of older patchsets were
/// superseded (and cancelled) when `N - 1` arrived.
#[instrument(
    skip_all,
    fields(change = %event.change.number, patchset = %event.patch_set.number)
)]
pub fn handle_patchset_created(
    event: &Event,
    pipeline: &dyn BuildPipeline,
    backend: &dyn Backend,
) -> Result<(), HandlerError> {
    validate(event)?;
    let patch = event.patch();

    let build_number = pipeline.create_build(&BuildRequest::for_patchset(event))?;
    info!(build = %build_number, revision = %event.patch_set.revision, "Created build");

    if let Err(source) = backend.save_build(&PatchBuild::new(build_number, patch)) {
        error!(
            build = %build_number,
            error = %source,
            "Build created but not recorded; it will not be cancelled when superseded"
        );
        return Err(HandlerError::Unrecorded {
            build: build_number,
            patch,
            source,
        });
    }

    let Some(previous) = patch.previous() else {
        return Ok(());
    };

    match backend.get_patch(&previous)? {
        Some(superseded) => {
            info!(
                superseded = %superseded.build_number,
                previous_patchset = %previous.patch_set,
                "Cancelling superseded build"
            );
            pipeline.cancel_build(superseded.build_number)?;
        }
        None => {
            debug!(
                previous_patchset = %previous.patch_set,
                "No build on record for previous patchset"
            );
        }
    }

    Ok(())
}

fn validate(event: &Event) -> Result<(), HandlerError> {
    if event.change.number.0 == 0 {
        return Err(HandlerError::InvalidEvent(
            "patchset-created event without a change number".to_string(),
        ));
    }
    if event.patch_set.number.0 == 0 {
        return Err(HandlerError::InvalidEvent(format!(
            "change {} has patchset number 0",
            event.change.number
        )));
    }
    Ok(())
}
