//! Shared abstractions for the AFT programming and resolution engine.
//!
//! - [`SyncMap`]: ordered map that never auto-creates entries
//! - [`OperationStatus`] / [`ProgrammingResult`]: per-operation outcomes
//! - [`RetryPolicy`]: bounded polling for convergence checks

mod retry;
mod status;
mod sync_map;

pub use retry::{RetryExhausted, RetryPolicy};
pub use status::{OperationStatus, ProgrammingResult};
pub use sync_map::{SyncMap, WriteOutcome};
