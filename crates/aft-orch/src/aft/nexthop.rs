//! Next-hop entries.

use aft_types::{MacAddress, NetworkInstance};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Key of a next-hop: index within a network instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NextHopKey {
    pub network_instance: NetworkInstance,
    pub index: u64,
}

impl NextHopKey {
    pub fn new(network_instance: impl Into<NetworkInstance>, index: u64) -> Self {
        Self {
            network_instance: network_instance.into(),
            index,
        }
    }
}

impl fmt::Display for NextHopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/nh:{}", self.network_instance, self.index)
    }
}

/// Outer IP header pushed by encap actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OuterHeader {
    pub src: IpAddr,
    pub dst: IpAddr,
}

impl OuterHeader {
    pub const fn new(src: IpAddr, dst: IpAddr) -> Self {
        Self { src, dst }
    }
}

impl fmt::Display for OuterHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

/// Discriminant of [`NextHopAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextHopKind {
    Forward,
    Decap,
    Encap,
    DecapEncap,
}

impl fmt::Display for NextHopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NextHopKind::Forward => "forward",
            NextHopKind::Decap => "decap",
            NextHopKind::Encap => "encap",
            NextHopKind::DecapEncap => "decap_encap",
        };
        f.write_str(s)
    }
}

/// What a next-hop does with a packet.
///
/// Forward egresses directly. The other three continue resolution of the
/// same destination in `inner_network_instance`; encap variants also push
/// an outer header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextHopAction {
    Forward {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interface: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip_address: Option<IpAddr>,
        /// Static neighbor MAC. Set means no neighbor resolution is needed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mac_address: Option<MacAddress>,
    },
    Decap {
        inner_network_instance: NetworkInstance,
    },
    Encap {
        outer: OuterHeader,
        inner_network_instance: NetworkInstance,
    },
    DecapEncap {
        outer: OuterHeader,
        inner_network_instance: NetworkInstance,
    },
}

impl NextHopAction {
    pub fn kind(&self) -> NextHopKind {
        match self {
            NextHopAction::Forward { .. } => NextHopKind::Forward,
            NextHopAction::Decap { .. } => NextHopKind::Decap,
            NextHopAction::Encap { .. } => NextHopKind::Encap,
            NextHopAction::DecapEncap { .. } => NextHopKind::DecapEncap,
        }
    }

    /// Network instance for the nested lookup, `None` for forward actions.
    pub fn inner_network_instance(&self) -> Option<&NetworkInstance> {
        match self {
            NextHopAction::Forward { .. } => None,
            NextHopAction::Decap {
                inner_network_instance,
            }
            | NextHopAction::Encap {
                inner_network_instance,
                ..
            }
            | NextHopAction::DecapEncap {
                inner_network_instance,
                ..
            } => Some(inner_network_instance),
        }
    }

    pub fn outer_header(&self) -> Option<&OuterHeader> {
        match self {
            NextHopAction::Encap { outer, .. } | NextHopAction::DecapEncap { outer, .. } => {
                Some(outer)
            }
            _ => None,
        }
    }

    pub fn interface(&self) -> Option<&str> {
        match self {
            NextHopAction::Forward { interface, .. } => interface.as_deref(),
            _ => None,
        }
    }

    /// Neighbor address whose resolution gates viability.
    ///
    /// `None` when there is no address or the MAC is statically configured.
    pub fn neighbor(&self) -> Option<IpAddr> {
        match self {
            NextHopAction::Forward {
                ip_address: Some(ip),
                mac_address: None,
                ..
            } => Some(*ip),
            _ => None,
        }
    }
}

/// A next-hop entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextHopEntry {
    pub key: NextHopKey,
    pub action: NextHopAction,
}

impl NextHopEntry {
    /// A forward next-hop out of `interface`.
    pub fn forward(
        network_instance: impl Into<NetworkInstance>,
        index: u64,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            key: NextHopKey::new(network_instance, index),
            action: NextHopAction::Forward {
                interface: Some(interface.into()),
                ip_address: None,
                mac_address: None,
            },
        }
    }

    /// A forward next-hop identified only by neighbor address.
    pub fn forward_ip(
        network_instance: impl Into<NetworkInstance>,
        index: u64,
        ip_address: IpAddr,
    ) -> Self {
        Self {
            key: NextHopKey::new(network_instance, index),
            action: NextHopAction::Forward {
                interface: None,
                ip_address: Some(ip_address),
                mac_address: None,
            },
        }
    }

    pub fn decap(
        network_instance: impl Into<NetworkInstance>,
        index: u64,
        inner: impl Into<NetworkInstance>,
    ) -> Self {
        Self {
            key: NextHopKey::new(network_instance, index),
            action: NextHopAction::Decap {
                inner_network_instance: inner.into(),
            },
        }
    }

    pub fn encap(
        network_instance: impl Into<NetworkInstance>,
        index: u64,
        outer: OuterHeader,
        inner: impl Into<NetworkInstance>,
    ) -> Self {
        Self {
            key: NextHopKey::new(network_instance, index),
            action: NextHopAction::Encap {
                outer,
                inner_network_instance: inner.into(),
            },
        }
    }

    pub fn decap_encap(
        network_instance: impl Into<NetworkInstance>,
        index: u64,
        outer: OuterHeader,
        inner: impl Into<NetworkInstance>,
    ) -> Self {
        Self {
            key: NextHopKey::new(network_instance, index),
            action: NextHopAction::DecapEncap {
                outer,
                inner_network_instance: inner.into(),
            },
        }
    }

    /// Sets the neighbor address of a forward next-hop.
    pub fn with_ip_address(mut self, ip: IpAddr) -> Self {
        if let NextHopAction::Forward { ip_address, .. } = &mut self.action {
            *ip_address = Some(ip);
        }
        self
    }

    /// Sets a static MAC on a forward next-hop.
    pub fn with_mac_address(mut self, mac: MacAddress) -> Self {
        if let NextHopAction::Forward { mac_address, .. } = &mut self.action {
            *mac_address = Some(mac);
        }
        self
    }

    /// Structural checks applied before the entry reaches the tables.
    pub fn validate(&self) -> Result<(), String> {
        if !self.key.network_instance.is_valid() {
            return Err("empty network instance".to_string());
        }
        match &self.action {
            NextHopAction::Forward {
                interface,
                mac_address,
                ..
            } => {
                if interface.as_deref().is_some_and(|i| i.trim().is_empty()) {
                    return Err("empty interface name".to_string());
                }
                if mac_address.is_some_and(|m| m.is_zero() || m.is_multicast()) {
                    return Err("static MAC must be a unicast address".to_string());
                }
            }
            NextHopAction::Decap {
                inner_network_instance,
            } => {
                if !inner_network_instance.is_valid() {
                    return Err("decap requires an inner network instance".to_string());
                }
            }
            NextHopAction::Encap {
                outer,
                inner_network_instance,
            }
            | NextHopAction::DecapEncap {
                outer,
                inner_network_instance,
            } => {
                if !inner_network_instance.is_valid() {
                    return Err("encap requires an inner network instance".to_string());
                }
                if outer.src.is_ipv4() != outer.dst.is_ipv4() {
                    return Err(format!("outer header {outer} mixes address families"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn outer() -> OuterHeader {
        OuterHeader::new("198.18.0.1".parse().unwrap(), "203.0.113.10".parse().unwrap())
    }

    #[test]
    fn test_neighbor_gating() {
        let ip: IpAddr = "192.0.2.2".parse().unwrap();
        let nh = NextHopEntry::forward("DEFAULT", 1, "port1").with_ip_address(ip);
        assert_eq!(nh.action.neighbor(), Some(ip));

        let static_mac = nh.with_mac_address("02:00:00:00:00:02".parse().unwrap());
        assert_eq!(static_mac.action.neighbor(), None);
        assert_eq!(static_mac.action.interface(), Some("port1"));
    }

    #[test]
    fn test_builders_ignore_non_forward() {
        let nh = NextHopEntry::decap("DEFAULT", 2, "VRF-A")
            .with_ip_address("192.0.2.9".parse().unwrap());
        assert_eq!(nh.action.kind(), NextHopKind::Decap);
        assert_eq!(nh.action.neighbor(), None);
        assert_eq!(
            nh.action.inner_network_instance(),
            Some(&NetworkInstance::new("VRF-A"))
        );
    }

    #[test]
    fn test_validate() {
        assert!(NextHopEntry::forward("DEFAULT", 1, "port1").validate().is_ok());
        assert!(NextHopEntry::forward("DEFAULT", 1, " ").validate().is_err());
        assert!(NextHopEntry::decap("DEFAULT", 1, "").validate().is_err());
        assert!(NextHopEntry::encap("", 1, outer(), "VRF-A").validate().is_err());

        let mixed = OuterHeader::new("198.18.0.1".parse().unwrap(), "2001:db8::1".parse().unwrap());
        assert!(NextHopEntry::encap("DEFAULT", 1, mixed, "VRF-A").validate().is_err());
        assert!(NextHopEntry::decap_encap("DEFAULT", 1, outer(), "VRF-A").validate().is_ok());
    }

    #[test]
    fn test_action_serde_tagged() {
        let nh = NextHopEntry::encap("DEFAULT", 7, outer(), "TE_VRF_222");
        let json = serde_json::to_value(&nh).unwrap();
        assert_eq!(json["action"]["kind"], "encap");
        assert_eq!(json["action"]["outer"]["dst"], "203.0.113.10");
        let back: NextHopEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, nh);
    }
}
