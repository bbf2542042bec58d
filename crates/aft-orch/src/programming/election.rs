//! Election IDs and leader tracking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 128-bit election ID, compared as an unsigned integer.
///
/// Field order makes the derived ordering compare `high` first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElectionId {
    pub high: u64,
    pub low: u64,
}

impl ElectionId {
    pub const fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    pub const fn from_low(low: u64) -> Self {
        Self { high: 0, low }
    }

    pub const fn as_u128(&self) -> u128 {
        ((self.high as u128) << 64) | self.low as u128
    }

    pub const fn from_u128(value: u128) -> Self {
        Self {
            high: (value >> 64) as u64,
            low: value as u64,
        }
    }

    /// The next ID, carrying from `low` into `high`. Saturates at the maximum.
    pub const fn next(&self) -> Self {
        Self::from_u128(self.as_u128().saturating_add(1))
    }
}

impl fmt::Display for ElectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.high, self.low)
    }
}

impl From<u128> for ElectionId {
    fn from(value: u128) -> Self {
        Self::from_u128(value)
    }
}

/// Highest election ID seen by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Election {
    current: Option<ElectionId>,
}

impl Election {
    pub const fn current(&self) -> Option<ElectionId> {
        self.current
    }

    /// Offers an ID. Returns the highest seen afterwards.
    pub fn offer(&mut self, id: ElectionId) -> ElectionId {
        let highest = self.current.map_or(id, |c| c.max(id));
        self.current = Some(highest);
        highest
    }

    /// A session is leader when its ID equals the highest seen.
    pub fn is_leader(&self, id: ElectionId) -> bool {
        self.current == Some(id)
    }
}
