//! IP prefixes in canonical (host bits cleared) form.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 or IPv6 prefix.
///
/// Host bits are always cleared on construction so that `10.1.2.3/24` and
/// `10.1.2.0/24` are the same key.
///
/// ```
/// use aft_types::IpPrefix;
///
/// let p: IpPrefix = "198.51.100.7/24".parse().unwrap();
/// assert_eq!(p.to_string(), "198.51.100.0/24");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    address: IpAddr,
    prefix_len: u8,
}

impl IpPrefix {
    /// Creates a prefix, masking off host bits.
    ///
    /// Returns an error if the length exceeds the address family maximum.
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        let max_len = max_len(&address);
        if prefix_len > max_len {
            return Err(ParseError::InvalidIpPrefix(format!(
                "{address}/{prefix_len}: length exceeds {max_len}"
            )));
        }
        Ok(Self {
            address: mask(address, prefix_len),
            prefix_len,
        })
    }

    /// A host route (/32 or /128) for the address.
    pub fn host(address: IpAddr) -> Self {
        Self {
            address,
            prefix_len: max_len(&address),
        }
    }

    pub const fn address(&self) -> IpAddr {
        self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub const fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }

    pub const fn is_ipv6(&self) -> bool {
        self.address.is_ipv6()
    }

    pub fn is_host_route(&self) -> bool {
        self.prefix_len == max_len(&self.address)
    }

    /// Returns true if `addr` falls inside this prefix.
    pub fn contains(&self, addr: IpAddr) -> bool {
        if addr.is_ipv4() != self.address.is_ipv4() {
            return false;
        }
        mask(addr, self.prefix_len) == self.address
    }
}

fn max_len(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask(address: IpAddr, prefix_len: u8) -> IpAddr {
    match address {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(bits & mask))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = u128::MAX
                .checked_shl(128 - u32::from(prefix_len))
                .unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(bits & mask))
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((addr, len)) = s.trim().rsplit_once('/') else {
            // A bare address is a host route.
            let address = s
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
            return Ok(Self::host(address));
        };

        let address = addr
            .parse::<IpAddr>()
            .map_err(|_| ParseError::InvalidIpAddress(addr.to_string()))?;
        let prefix_len = len
            .parse::<u8>()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        Self::new(address, prefix_len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> String {
        prefix.to_string()
    }
}
