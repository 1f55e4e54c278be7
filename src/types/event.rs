//! Change-lifecycle events as handed to the dispatch loop.
//!
//! Events arrive already decoded. Field names follow the review server's
//! stream format (`type`, `change`, `patchSet`, `comment`, `refUpdate`) so a
//! stream of JSON lines deserializes directly; unknown fields are ignored.

use serde::{Deserialize, Serialize};

use super::build::Patch;
use super::ids::{ChangeNumber, PatchSetNumber};

/// Event type names used as dispatch keys.
pub mod kind {
    /// A new patchset was uploaded to a change.
    pub const PATCHSET_CREATED: &str = "patchset-created";

    /// A reviewer commented on a change.
    pub const COMMENT_ADDED: &str = "comment-added";

    /// A ref was updated on the review server (typically a submitted change).
    pub const REF_UPDATED: &str = "ref-updated";
}

/// A logical review unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub number: ChangeNumber,
}

/// One revision of a change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    pub number: PatchSetNumber,

    /// Commit hash of this revision.
    #[serde(default)]
    pub revision: String,

    /// Fetchable ref, e.g. `refs/changes/34/1234/2`.
    #[serde(default, rename = "ref")]
    pub git_ref: String,
}

/// Payload of a `ref-updated` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdate {
    #[serde(default)]
    pub project: String,
    pub ref_name: String,
    #[serde(default)]
    pub old_rev: String,
    pub new_rev: String,
}

impl RefUpdate {
    /// Returns the branch name if this update targets `refs/heads/*`.
    pub fn branch(&self) -> Option<&str> {
        self.ref_name
            .strip_prefix("refs/heads/")
            .filter(|name| !name.is_empty())
    }

    /// Returns true if the ref was deleted (new revision is all zeros).
    pub fn is_deletion(&self) -> bool {
        !self.new_rev.is_empty() && self.new_rev.bytes().all(|b| b == b'0')
    }
}

/// An inbound change-lifecycle notification.
///
/// Owned by the dispatch loop and lent read-only to each handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Dispatch key, one of [`kind`] or any other string (ignored if unrouted).
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub change: Change,

    #[serde(default)]
    pub patch_set: PatchSet,

    /// Comment text; only populated for `comment-added`.
    #[serde(default)]
    pub comment: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_update: Option<RefUpdate>,
}

impl Event {
    /// Creates a `patchset-created` event.
    pub fn patchset_created(change: ChangeNumber, patch_set: PatchSet) -> Self {
        Event {
            kind: kind::PATCHSET_CREATED.to_string(),
            change: Change { number: change },
            patch_set,
            ..Default::default()
        }
    }

    /// Creates a `comment-added` event.
    pub fn comment_added(
        change: ChangeNumber,
        patch_set: PatchSet,
        comment: impl Into<String>,
    ) -> Self {
        Event {
            kind: kind::COMMENT_ADDED.to_string(),
            change: Change { number: change },
            patch_set,
            comment: comment.into(),
            ..Default::default()
        }
    }

    /// Creates a `ref-updated` event.
    pub fn ref_updated(update: RefUpdate) -> Self {
        Event {
            kind: kind::REF_UPDATED.to_string(),
            ref_update: Some(update),
            ..Default::default()
        }
    }

    /// The (change, patchset) identity this event refers to.
    pub fn patch(&self) -> Patch {
        Patch::new(self.change.number, self.patch_set.number)
    }
}
