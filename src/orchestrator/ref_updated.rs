//! Branch builds after a ref update.

use tracing::{debug, info, instrument};

use crate::backend::Backend;
use crate::pipeline::{BuildPipeline, BuildRequest};
use crate::router::HandlerError;
use crate::types::Event;

/// Handles `ref-updated`: builds the new tip of an updated branch.
///
/// Only `refs/heads/*` updates are built. Review refs, tags, meta refs and
/// branch deletions are ignored, as is an event without ref-update data.
#[instrument(skip_all, fields(ref_name = tracing::field::Empty))]
pub fn handle_ref_updated(
    event: &Event,
    pipeline: &dyn BuildPipeline,
    _backend: &dyn Backend,
) -> Result<(), HandlerError> {
    let Some(update) = &event.ref_update else {
        debug!("ref-updated event without ref update data");
        return Ok(());
    };
    tracing::Span::current().record("ref_name", update.ref_name.as_str());

    let Some(branch) = update.branch() else {
        debug!("Not a branch, ignoring");
        return Ok(());
    };
    if update.is_deletion() {
        debug!(branch, "Branch deleted, nothing to build");
        return Ok(());
    }
    if update.new_rev.is_empty() {
        return Err(HandlerError::InvalidEvent(format!(
            "update of {} has no new revision",
            update.ref_name
        )));
    }

    let build = pipeline.create_build(&BuildRequest::for_branch(branch, &update.new_rev))?;
    info!(build = %build, branch, revision = %update.new_rev, "Created branch build");
    Ok(())
}
