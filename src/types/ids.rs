//! Newtype wrappers for review and CI identifiers.
//!
//! These keep change numbers, patchset numbers and build numbers from being
//! mixed up, and make signatures like `cancel_build(BuildNumber)` say what
//! they take.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A change number on the review server. Stable for the life of the change.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChangeNumber(pub u64);

impl fmt::Display for ChangeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChangeNumber {
    fn from(n: u64) -> Self {
        ChangeNumber(n)
    }
}

/// A patchset number within a change. The first patchset is 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PatchSetNumber(pub u64);

impl PatchSetNumber {
    /// Returns the number of the patchset immediately before this one.
    ///
    /// Returns `None` for the first patchset (and for the invalid patchset 0).
    pub fn previous(self) -> Option<PatchSetNumber> {
        match self.0 {
            0 | 1 => None,
            n => Some(PatchSetNumber(n - 1)),
        }
    }
}

impl fmt::Display for PatchSetNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PatchSetNumber {
    fn from(n: u64) -> Self {
        PatchSetNumber(n)
    }
}

/// A build number assigned by the CI pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildNumber(pub u64);

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for BuildNumber {
    fn from(n: u64) -> Self {
        BuildNumber(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod patchset_number {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn previous_is_one_less(n in 2u64..=u64::MAX) {
                prop_assert_eq!(PatchSetNumber(n).previous(), Some(PatchSetNumber(n - 1)));
            }

            #[test]
            fn serde_is_transparent(n: u64) {
                let json = serde_json::to_string(&PatchSetNumber(n)).unwrap();
                prop_assert_eq!(json, n.to_string());
            }
        }

        #[test]
        fn first_patchset_has_no_previous() {
            assert_eq!(PatchSetNumber(1).previous(), None);
            assert_eq!(PatchSetNumber(0).previous(), None);
        }
    }

    mod build_number {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn display_format(n: u64) {
                prop_assert_eq!(format!("{}", BuildNumber(n)), format!("#{}", n));
            }

            #[test]
            fn ordering_matches_underlying(a: u64, b: u64) {
                prop_assert_eq!(BuildNumber(a) < BuildNumber(b), a < b);
            }
        }
    }

    #[test]
    fn change_number_displays_bare() {
        assert_eq!(ChangeNumber(9999).to_string(), "9999");
    }
}
