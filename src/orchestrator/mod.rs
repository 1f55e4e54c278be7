//! Build orchestration: when to create and cancel CI builds.
//!
//! | Event | Handler | Effect |
//! |-------|---------|--------|
//! | `patchset-created` | [`handle_patchset_created`] | build, cancel the prior build |
//! | `comment-added` | [`handle_comment_added`] | rebuild on a `retest` line |
//! | `ref-updated` | [`handle_ref_updated`] | build the new tip of an updated branch |
//!
//! None of the handlers retry. Errors go back to the router, which logs them
//! and carries on with the next handler.

mod comment;
mod patchset;
mod ref_updated;

use crate::router::RouterBuilder;
use crate::types::kind;

pub use comment::{RETEST_TOKEN, handle_comment_added, is_retest_request};
pub use patchset::handle_patchset_created;
pub use ref_updated::handle_ref_updated;

/// Handler name for patchset builds.
pub const PATCHSET_BUILD_HANDLER: &str = "patchset-build";

/// Handler name for comment-triggered rebuilds.
pub const RETEST_HANDLER: &str = "retest";

/// Handler name for branch builds.
pub const BRANCH_BUILD_HANDLER: &str = "branch-build";

/// Registers all build handlers under their event types.
pub fn register_build_handlers(router: &mut RouterBuilder) -> &mut RouterBuilder {
    router
        .register(
            kind::PATCHSET_CREATED,
            PATCHSET_BUILD_HANDLER,
            handle_patchset_created,
        )
        .register(kind::COMMENT_ADDED, RETEST_HANDLER, handle_comment_added)
        .register(kind::REF_UPDATED, BRANCH_BUILD_HANDLER, handle_ref_updated)
}
