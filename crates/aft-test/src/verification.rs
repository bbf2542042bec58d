//! Verification helpers for AFT integration tests.
//!
//! Each helper returns a [`VerificationError`] naming what differed, so a
//! failing test shows which egress or which backup layer went wrong.

use aft_common::OperationStatus;
use aft_orch::aft::{AftTables, EntryKind};
use aft_orch::programming::OperationResult;
use aft_orch::resolve::ResolutionResult;
use aft_orch::validate::{HeaderReport, ValidationReport};
use aft_orch::AftError;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error(transparent)]
    Aft(#[from] AftError),

    #[error("{prefix}: expected egress {expected:?}, got {actual:?}")]
    EgressMismatch {
        prefix: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("{prefix}: expected unresolved, got {actual}")]
    UnexpectedlyResolved { prefix: String, actual: String },

    #[error("{prefix}: expected backup {expected}, activated {actual:?}")]
    BackupMismatch {
        prefix: String,
        expected: String,
        actual: Vec<String>,
    },

    #[error("operation {id}: expected {expected}, got {actual}")]
    OperationStatus {
        id: u64,
        expected: String,
        actual: String,
    },

    #[error("traffic check failed:\n{0}")]
    Traffic(String),

    #[error("header check failed on {port}: {report}")]
    Headers { port: String, report: String },

    #[error("expected {expected} {kind} entries, found {actual}")]
    TableSize {
        kind: String,
        expected: usize,
        actual: usize,
    },
}

pub type VerifyResult<T> = Result<T, VerificationError>;

/// The set of egress labels must equal `expected` exactly.
pub fn assert_egress(result: &ResolutionResult, expected: &[&str]) -> VerifyResult<()> {
    let actual: BTreeSet<String> = result.egress.iter().map(|e| e.label()).collect();
    let wanted: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
    if actual != wanted {
        return Err(VerificationError::EgressMismatch {
            prefix: format!("{}/{}", result.network_instance, result.prefix),
            expected: wanted.into_iter().collect(),
            actual: actual.into_iter().collect(),
        });
    }
    Ok(())
}

pub fn assert_unresolved(result: &ResolutionResult) -> VerifyResult<()> {
    if !result.unresolved {
        return Err(VerificationError::UnexpectedlyResolved {
            prefix: format!("{}/{}", result.network_instance, result.prefix),
            actual: result.to_string(),
        });
    }
    Ok(())
}

/// The last activated backup must be `expected` (as `NI/nhg:ID`).
pub fn assert_backup(result: &ResolutionResult, expected: &str) -> VerifyResult<()> {
    let actual: Vec<String> = result.activated_backups().iter().map(|k| k.to_string()).collect();
    if actual.last().map(String::as_str) != Some(expected) {
        return Err(VerificationError::BackupMismatch {
            prefix: format!("{}/{}", result.network_instance, result.prefix),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

pub fn assert_all_status(
    results: &[OperationResult],
    expected: OperationStatus,
) -> VerifyResult<()> {
    for result in results {
        match &result.status {
            Ok(status) if *status == expected => {}
            Ok(status) => {
                return Err(VerificationError::OperationStatus {
                    id: result.id,
                    expected: expected.to_string(),
                    actual: status.to_string(),
                })
            }
            Err(e) => {
                return Err(VerificationError::OperationStatus {
                    id: result.id,
                    expected: expected.to_string(),
                    actual: e.to_string(),
                })
            }
        }
    }
    Ok(())
}

pub fn assert_traffic_pass(report: &ValidationReport) -> VerifyResult<()> {
    if !report.pass {
        return Err(VerificationError::Traffic(report.to_string()));
    }
    Ok(())
}

pub fn assert_headers_pass(reports: &[(String, HeaderReport)]) -> VerifyResult<()> {
    for (port, report) in reports {
        if !report.pass() {
            return Err(VerificationError::Headers {
                port: port.clone(),
                report: report.to_string(),
            });
        }
    }
    Ok(())
}

pub fn assert_table_size(tables: &AftTables, kind: EntryKind, expected: usize) -> VerifyResult<()> {
    let actual = tables.count(kind);
    if actual != expected {
        return Err(VerificationError::TableSize {
            kind: kind.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

pub fn assert_tables_empty(tables: &AftTables) -> VerifyResult<()> {
    for kind in [EntryKind::NextHop, EntryKind::NextHopGroup, EntryKind::Prefix] {
        assert_table_size(tables, kind, 0)?;
    }
    Ok(())
}
