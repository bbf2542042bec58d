//! Programming log, sessions and the forwarding-plane stage.

mod applier;
mod election;
mod fib;
mod session;
mod types;

pub use applier::ProgrammingLog;
pub use election::{Election, ElectionId};
pub use fib::{FibChange, FibProgrammer, InMemoryFib};
pub use session::Session;
pub use types::{AckMode, InstalledEntry, OperationResult, Persistence, ProgrammingStats};
