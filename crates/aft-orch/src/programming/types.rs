//! Programming log result and mode types.

use crate::aft::{AftEntry, EntryKey, OpType};
use crate::error::AftError;
use aft_common::{OperationStatus, ProgrammingResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far a batch waits before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Return once the RIB is updated.
    Rib,
    /// Also wait for the forwarding plane (FIB ACK).
    RibAndFib,
}

/// Fate of a session's entries when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    Preserve,
    Delete,
}

/// Result of one operation in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub id: u64,
    pub op: OpType,
    pub key: EntryKey,
    pub status: Result<OperationStatus, AftError>,
    pub programming_result: ProgrammingResult,
}

impl OperationResult {
    pub fn failed(id: u64, op: OpType, key: EntryKey, error: AftError) -> Self {
        Self {
            id,
            op,
            key,
            status: Err(error),
            programming_result: ProgrammingResult::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }

    /// True if the operation changed or confirmed the RIB, even when the
    /// forwarding plane later refused it or did not answer in time.
    pub fn reached_rib(&self) -> bool {
        !matches!(
            self.status,
            Err(AftError::InvalidEntry { .. } | AftError::NotFound(_) | AftError::NotLeader { .. })
        )
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Ok(status) => write!(
                f,
                "op {} {} {}: {} ({})",
                self.id, self.op, self.key, status, self.programming_result
            ),
            Err(e) => write!(
                f,
                "op {} {} {}: error: {} ({})",
                self.id, self.op, self.key, e, self.programming_result
            ),
        }
    }
}

/// An entry as returned by Get, with its acknowledgment level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledEntry {
    pub entry: AftEntry,
    pub programming_result: ProgrammingResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgrammingStats {
    pub batches: u64,
    pub operations: u64,
    pub installed: u64,
    pub unchanged: u64,
    pub replaced: u64,
    pub deleted: u64,
    pub not_found: u64,
    pub failed: u64,
    /// Operations refused because the caller was not leader.
    pub rejected: u64,
    pub fib_acked: u64,
    pub fib_failed: u64,
}
