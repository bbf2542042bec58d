//! Per-operation outcomes reported by the programming log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What an operation did to the RIB.
///
/// Every variant is a success. Failures travel as errors alongside a
/// [`ProgrammingResult::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// A new entry was installed.
    Installed,
    /// The entry already existed with identical content.
    Unchanged,
    /// An existing entry was overwritten with new content.
    Replaced,
    /// The entry was removed.
    Deleted,
    /// Delete of an entry that was not present. Not an error.
    NotFound,
}

impl OperationStatus {
    /// Returns true if the RIB content changed.
    pub const fn is_change(&self) -> bool {
        matches!(
            self,
            OperationStatus::Installed | OperationStatus::Replaced | OperationStatus::Deleted
        )
    }

    pub const fn is_noop(&self) -> bool {
        !self.is_change()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Installed => "installed",
            OperationStatus::Unchanged => "unchanged",
            OperationStatus::Replaced => "replaced",
            OperationStatus::Deleted => "deleted",
            OperationStatus::NotFound => "not_found",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgement level reached by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgrammingResult {
    /// Accepted into the RIB and confirmed by the forwarding plane.
    InstalledInFib,
    /// Accepted into the RIB; forwarding-plane confirmation not requested
    /// or not yet received.
    InstalledInRibOnly,
    Failed,
}

impl ProgrammingResult {
    pub const fn is_installed(&self) -> bool {
        !matches!(self, ProgrammingResult::Failed)
    }
}

impl fmt::Display for ProgrammingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgrammingResult::InstalledInFib => "INSTALLED_IN_FIB",
            ProgrammingResult::InstalledInRibOnly => "INSTALLED_IN_RIB_ONLY",
            ProgrammingResult::Failed => "FAILED",
        };
        f.write_str(s)
    }
}
