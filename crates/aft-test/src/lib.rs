//! Test infrastructure for the AFT engine.
//!
//! Provides:
//! - Entry fixtures for the common programming scenarios
//! - A device configuration store, traffic generator and packet capture
//!   simulated in memory
//! - Verification helpers that turn mismatches into descriptive errors

pub mod fixtures;
mod simulation;
mod verification;

pub use simulation::{InMemoryDeviceConfig, SimulatedTrafficGenerator};
pub use verification::*;
