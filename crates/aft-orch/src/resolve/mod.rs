//! Prefix resolution through next-hop-group chains.

mod engine;
mod result;

pub use engine::{resolve_in, ResolutionEngine};
pub use result::{Egress, PathHop, PathStep, ResolutionResult, UnresolvedReason};
