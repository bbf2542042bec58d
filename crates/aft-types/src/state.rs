//! Operational state reported for interfaces.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interface operational state.
///
/// Anything other than [`OperState::Up`] makes next-hops egressing the
/// interface non-viable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperState {
    Up,
    Down,
    LowerLayerDown,
    #[default]
    Unknown,
}

impl OperState {
    pub const fn is_up(&self) -> bool {
        matches!(self, OperState::Up)
    }

    pub const fn from_up(up: bool) -> Self {
        if up {
            OperState::Up
        } else {
            OperState::Down
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OperState::Up => "UP",
            OperState::Down => "DOWN",
            OperState::LowerLayerDown => "LOWER_LAYER_DOWN",
            OperState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UP" => Ok(OperState::Up),
            "DOWN" => Ok(OperState::Down),
            "LOWER_LAYER_DOWN" => Ok(OperState::LowerLayerDown),
            "UNKNOWN" => Ok(OperState::Unknown),
            _ => Err(ParseError::InvalidOperState(s.to_string())),
        }
    }
}
