//! Matching policy for labels recorded in different runs.
//!
//! Object identities (memory addresses, mutex objects) differ between
//! runs of the program under test while event shapes stay stable. During
//! partial replay the checker therefore validates synchronization pairs
//! under a relaxed location comparison; everywhere else comparisons are
//! exact.

use crate::loc::Loc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayPolicy {
    /// Accept any pair of locations as matching. Only sound while the
    /// surrounding shapes (kind, access kind, class, exclusivity) are
    /// still compared exactly.
    pub relaxed_locations: bool,
}

impl ReplayPolicy {
    /// Exact location equality.
    pub fn strict() -> Self {
        ReplayPolicy {
            relaxed_locations: false,
        }
    }

    /// Location-insensitive matching for partial replay across runs.
    pub fn relaxed() -> Self {
        ReplayPolicy {
            relaxed_locations: true,
        }
    }

    pub(crate) fn locs_match(&self, a: &Loc, b: &Loc) -> bool {
        self.relaxed_locations || a == b
    }
}
