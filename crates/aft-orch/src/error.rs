//! Error type shared by programming, resolution and the harness.

use crate::validate::ValidationError;
use aft_types::ParseError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the AFT engine.
///
/// An unresolvable prefix is not an error: it is a
/// [`ResolutionResult`](crate::resolve::ResolutionResult) with an empty
/// egress set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AftError {
    /// Replace of an entry that does not exist.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// Structural validation failed (missing field, zero weight, cyclic backup).
    #[error("invalid entry {key}: {reason}")]
    InvalidEntry { key: String, reason: String },

    /// A wait did not complete in time.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// Resolution did not reach the expected shape within the retry budget.
    #[error("{network_instance}/{prefix} did not converge after {attempts} attempts: {detail}")]
    ConvergenceFailure {
        network_instance: String,
        prefix: String,
        attempts: u32,
        detail: String,
    },

    /// The session's election ID is not the highest seen.
    #[error("not leader: session election id {session} below current {current}")]
    NotLeader { session: u128, current: u128 },

    /// The forwarding plane has no room for another entry.
    #[error("forwarding table exhausted (capacity {capacity})")]
    FibExhausted { capacity: usize },

    /// A collaborator (device config, traffic generator, capture) failed.
    #[error("{service} error: {message}")]
    External { service: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl AftError {
    pub fn invalid(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::External {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Errors worth retrying after the forwarding state settles.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AftError::Timeout { .. }
                | AftError::ConvergenceFailure { .. }
                | AftError::External { .. }
        )
    }
}

impl From<std::io::Error> for AftError {
    fn from(e: std::io::Error) -> Self {
        AftError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AftError {
    fn from(e: serde_json::Error) -> Self {
        AftError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AftError>;
