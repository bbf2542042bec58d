//! Liveness inputs and viability change notifications.

use crate::aft::{NextHopAction, NextHopKey};
use aft_types::OperState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Interface and neighbor state the viability of forward next-hops
/// depends on.
///
/// Interfaces never reported are treated as down; neighbors never
/// reported are unresolved.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    interfaces: HashMap<String, OperState>,
    neighbors: HashMap<IpAddr, bool>,
}

/// Shared liveness state. Always locked after [`SharedTables`](crate::aft::SharedTables).
pub type SharedLiveness = Arc<RwLock<Liveness>>;

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedLiveness {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn interface_state(&self, name: &str) -> OperState {
        self.interfaces.get(name).copied().unwrap_or_default()
    }

    pub fn interface_up(&self, name: &str) -> bool {
        self.interface_state(name).is_up()
    }

    pub fn neighbor_resolved(&self, ip: IpAddr) -> bool {
        self.neighbors.get(&ip).copied().unwrap_or(false)
    }

    /// Records an interface state. Returns true if it changed.
    pub fn set_interface(&mut self, name: &str, state: OperState) -> bool {
        self.interfaces.insert(name.to_string(), state) != Some(state)
    }

    /// Records a neighbor resolution. Returns true if it changed.
    pub fn set_neighbor(&mut self, ip: IpAddr, resolved: bool) -> bool {
        self.neighbors.insert(ip, resolved).unwrap_or(false) != resolved
    }

    /// Viability of a next-hop action under the current state.
    ///
    /// A forward action needs its interface up (if named) and its
    /// neighbor resolved (if an address without static MAC is given).
    /// A forward action with neither interface nor address is never
    /// viable. Decap and encap actions have no local egress and are
    /// always viable; their egress is decided by the nested lookup.
    pub fn evaluate(&self, action: &NextHopAction) -> bool {
        match action {
            NextHopAction::Forward {
                interface: None,
                ip_address: None,
                ..
            } => false,
            NextHopAction::Forward { interface, .. } => {
                let interface_ok = interface.as_deref().map_or(true, |i| self.interface_up(i));
                let neighbor_ok = action.neighbor().map_or(true, |ip| self.neighbor_resolved(ip));
                interface_ok && neighbor_ok
            }
            NextHopAction::Decap { .. }
            | NextHopAction::Encap { .. }
            | NextHopAction::DecapEncap { .. } => true,
        }
    }
}

/// Which liveness input triggered a viability change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ViabilityCause {
    Interface { name: String, state: OperState },
    Neighbor { ip: IpAddr, resolved: bool },
    Reevaluation,
}

/// A next-hop whose viability flipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViabilityChange {
    pub next_hop: NextHopKey,
    pub viable: bool,
    pub cause: ViabilityCause,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViabilityStats {
    pub interface_events: u64,
    pub neighbor_events: u64,
    pub transitions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aft::NextHopEntry;

    #[test]
    fn test_unknown_interface_is_down() {
        let liveness = Liveness::new();
        assert!(!liveness.interface_up("port9"));
        assert!(!liveness.evaluate(&NextHopEntry::forward("DEFAULT", 1, "port9").action));
    }

    #[test]
    fn test_forward_requires_interface_and_neighbor() {
        let ip: IpAddr = "192.0.2.2".parse().unwrap();
        let mut liveness = Liveness::new();
        let nh = NextHopEntry::forward("DEFAULT", 1, "port2").with_ip_address(ip);

        liveness.set_interface("port2", OperState::Up);
        assert!(!liveness.evaluate(&nh.action));

        liveness.set_neighbor(ip, true);
        assert!(liveness.evaluate(&nh.action));

        let static_mac = NextHopEntry::forward("DEFAULT", 2, "port2")
            .with_ip_address("192.0.2.3".parse().unwrap())
            .with_mac_address("02:00:00:00:00:03".parse().unwrap());
        assert!(liveness.evaluate(&static_mac.action));
    }

    #[test]
    fn test_forward_without_interface_or_address_never_viable() {
        let liveness = Liveness::new();
        let bare = NextHopAction::Forward {
            interface: None,
            ip_address: None,
            mac_address: Some("02:00:00:00:00:01".parse().unwrap()),
        };
        assert!(!liveness.evaluate(&bare));
    }

    #[test]
    fn test_change_detection() {
        let ip: IpAddr = "192.0.2.2".parse().unwrap();
        let mut liveness = Liveness::new();
        assert!(liveness.set_interface("port2", OperState::Up));
        assert!(!liveness.set_interface("port2", OperState::Up));
        assert!(liveness.set_interface("port2", OperState::Down));

        // Unresolved is the default, so reporting it first is not a change.
        assert!(!liveness.set_neighbor(ip, false));
        assert!(liveness.set_neighbor(ip, true));
    }

    #[test]
    fn test_decap_is_structurally_viable() {
        let liveness = Liveness::new();
        assert!(liveness.evaluate(&NextHopEntry::decap("DEFAULT", 1, "VRF-A").action));
    }
}
