//! AFT orchestration engine.
//!
//! Models how a router resolves a destination through next-hop groups and
//! checks that traffic follows the resolution.
//!
//! ```text
//! [Session] ──> [ProgrammingLog] ──> [AftTables] <── [ViabilityMonitor]
//!                     │                   │
//!                     ↓                   ↓
//!                   [FIB]        [ResolutionEngine] ──> [TrafficValidator]
//! ```
//!
//! # Key Components
//!
//! - [`programming::ProgrammingLog`]: batch application with election and
//!   FIB acknowledgment
//! - [`viability::ViabilityMonitor`]: interface and neighbor liveness
//! - [`resolve::ResolutionEngine`]: backup walk, weighted ECMP and
//!   decap/encap
//! - [`validate`]: traffic split and header checks
//! - [`harness::Harness`]: all of the above wired from one [`config::AftConfig`]

pub mod aft;
pub mod audit;
pub mod config;
pub mod error;
pub mod external;
pub mod harness;
pub mod programming;
pub mod resolve;
pub mod scenario;
pub mod validate;
pub mod viability;

pub use config::AftConfig;
pub use error::{AftError, Result};
pub use harness::Harness;
