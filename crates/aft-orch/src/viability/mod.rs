//! Next-hop viability tracking.

mod monitor;
mod types;

pub use monitor::ViabilityMonitor;
pub use types::{Liveness, SharedLiveness, ViabilityCause, ViabilityChange, ViabilityStats};
