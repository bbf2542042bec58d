//! Network instance (VRF) names.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of a routing context. Every AFT key is scoped by one.
///
/// The global routing table is `DEFAULT`; everything else is a VRF.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkInstance(String);

impl NetworkInstance {
    /// Name of the global routing context.
    pub const DEFAULT_NAME: &'static str = "DEFAULT";

    /// Creates a network instance with the given name.
    ///
    /// No validation is performed here; use [`FromStr`] for checked input.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The global routing context.
    pub fn default_instance() -> Self {
        Self(Self::DEFAULT_NAME.to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT_NAME
    }

    /// Returns false for names that can never identify a routing context.
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NetworkInstance {
    fn default() -> Self {
        Self::default_instance()
    }
}

impl fmt::Display for NetworkInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NetworkInstance {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err(ParseError::InvalidNetworkInstance(s.to_string()));
        }
        Ok(Self(name.to_string()))
    }
}

impl From<&str> for NetworkInstance {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for NetworkInstance {
    fn from(name: String) -> Self {
        Self(name)
    }
}
