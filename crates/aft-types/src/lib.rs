//! Value types shared by the AFT programming, resolution and validation crates.
//!
//! - [`NetworkInstance`]: named routing context (VRF); `DEFAULT` is the global table
//! - [`IpPrefix`]: canonical IP prefix used as the exact-match key of prefix entries
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`OperState`]: operational state reported for interfaces

mod instance;
mod ip;
mod mac;
mod state;

pub use instance::NetworkInstance;
pub use ip::IpPrefix;
pub use mac::MacAddress;
pub use state::OperState;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid network instance name: {0:?}")]
    InvalidNetworkInstance(String),

    #[error("invalid oper state: {0}")]
    InvalidOperState(String),
}
