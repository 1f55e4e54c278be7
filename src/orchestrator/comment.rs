//! Comment-triggered rebuilds.

use tracing::{info, instrument, trace};

use crate::backend::Backend;
use crate::pipeline::{BuildPipeline, BuildRequest};
use crate::router::HandlerError;
use crate::types::Event;

/// A comment line consisting of exactly this token requests a rebuild.
pub const RETEST_TOKEN: &str = "retest";

/// Returns true if some line of `comment` is exactly [`RETEST_TOKEN`].
///
/// Lines are split on `\n` only; nothing else is trimmed. `" retest"`,
/// `"retest "`, `"Retest"` and `"not retest"` do not count.
pub fn is_retest_request(comment: &str) -> bool {
    comment.split('\n').any(|line| line == RETEST_TOKEN)
}

/// Handles `comment-added`: creates one build for the current patchset when
/// the comment asks for a retest. Nothing is recorded or cancelled.
#[instrument(
    skip_all,
    fields(change = %event.change.number, patchset = %event.patch_set.number)
)]
pub fn handle_comment_added(
    event: &Event,
    pipeline: &dyn BuildPipeline,
    _backend: &dyn Backend,
) -> Result<(), HandlerError> {
    if !is_retest_request(&event.comment) {
        trace!("Comment does not request a retest");
        return Ok(());
    }

    let build = pipeline.create_build(&BuildRequest::for_patchset(event))?;
    info!(build = %build, "Created retest build");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockBackend, MockPipeline, arb_non_retest_line, comment_added};
    use proptest::prelude::*;

    fn builds_for(comment: &str) -> usize {
        let pipeline = MockPipeline::new();
        let backend = MockBackend::new();
        handle_comment_added(&comment_added(1, 1, comment), &pipeline, &backend).unwrap();
        assert_eq!(backend.save_calls(), 0);
        assert_eq!(backend.lookup_calls(), 0);
        assert_eq!(pipeline.cancel_calls(), 0);
        pipeline.create_calls()
    }

    #[test]
    fn bare_retest_creates_a_build() {
        assert_eq!(builds_for("retest"), 1);
    }

    #[test]
    fn retest_on_its_own_line() {
        assert_eq!(builds_for("\nretest\n\t\t"), 1);
    }

    #[test]
    fn retest_among_other_lines() {
        let comment =
            "\nJust to make sure\nretest\nWhen this is done the change can be merged\n\t\t";
        assert_eq!(builds_for(comment), 1);
    }

    #[test]
    fn repeated_retest_lines_create_one_build() {
        assert_eq!(builds_for("retest\nretest\nretest"), 1);
    }

    #[test]
    fn retest_inside_a_line_is_ignored() {
        assert_eq!(builds_for("not retest"), 0);
        assert_eq!(builds_for("please retest this"), 0);
        assert_eq!(builds_for("retested"), 0);
    }

    #[test]
    fn surrounding_whitespace_is_not_tolerated() {
        assert_eq!(builds_for(" retest"), 0);
        assert_eq!(builds_for("retest "), 0);
        assert_eq!(builds_for("\n\tretest\n\t"), 0);
        assert_eq!(builds_for("retest\r\n"), 0);
    }

    #[test]
    fn match_is_case_sensitive() {
        assert_eq!(builds_for("Retest"), 0);
        assert_eq!(builds_for("RETEST"), 0);
    }

    #[test]
    fn empty_comment_is_ignored() {
        assert_eq!(builds_for(""), 0);
    }

    #[test]
    fn build_targets_the_commented_patchset() {
        let pipeline = MockPipeline::new();
        let event = comment_added(77, 4, "retest");
        handle_comment_added(&event, &pipeline, &MockBackend::new()).unwrap();

        let created = pipeline.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].commit, event.patch_set.revision);
        assert_eq!(created[0].branch, event.patch_set.git_ref);
    }

    #[test]
    fn create_failure_is_surfaced() {
        let pipeline = MockPipeline::new().failing_create();
        let backend = MockBackend::new();
        let err =
            handle_comment_added(&comment_added(1, 1, "retest"), &pipeline, &backend).unwrap_err();
        assert!(matches!(err, HandlerError::Pipeline(_)));
    }

    proptest! {
        #[test]
        fn no_exact_line_means_no_build(
            lines in prop::collection::vec(arb_non_retest_line(), 0..8),
        ) {
            let comment = lines.join("\n");
            prop_assert!(!is_retest_request(&comment));
            prop_assert_eq!(builds_for(&comment), 0);
        }

        #[test]
        fn any_exact_line_means_exactly_one_build(
            before in prop::collection::vec(arb_non_retest_line(), 0..5),
            after in prop::collection::vec(arb_non_retest_line(), 0..5),
            copies in 1usize..4,
        ) {
            let mut lines = before;
            lines.extend(std::iter::repeat_n(RETEST_TOKEN.to_string(), copies));
            lines.extend(after);
            let comment = lines.join("\n");

            prop_assert!(is_retest_request(&comment));
            prop_assert_eq!(builds_for(&comment), 1);
        }
    }
}
