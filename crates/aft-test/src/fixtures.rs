//! Entry fixtures for common programming scenarios.
//!
//! Next-hops and groups live in `DEFAULT` unless a fixture says otherwise;
//! VRF prefixes point back into `DEFAULT` the way gRIBI clients program
//! them.

use aft_orch::aft::{
    AftEntry, AftOperation, NextHopEntry, NextHopGroupEntry, OuterHeader, PrefixEntry,
};
use aft_orch::config::ScaleConfig;
use aft_types::{IpPrefix, MacAddress, NetworkInstance};
use std::net::{IpAddr, Ipv4Addr};

pub const DEFAULT: &str = "DEFAULT";
pub const VRF_A: &str = "VRF-A";

/// Hands out increasing operation IDs.
#[derive(Debug, Default)]
pub struct OpIds(u64);

impl OpIds {
    pub fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }

    pub fn add(&mut self, entry: impl Into<AftEntry>) -> AftOperation {
        AftOperation::add(self.next(), entry)
    }

    pub fn replace(&mut self, entry: impl Into<AftEntry>) -> AftOperation {
        AftOperation::replace(self.next(), entry)
    }

    pub fn delete(&mut self, entry: impl Into<AftEntry>) -> AftOperation {
        AftOperation::delete(self.next(), entry)
    }
}

/// Addresses used across the scenarios.
pub mod addr {
    use super::*;

    pub fn prefix_v4(octets: [u8; 4], len: u8) -> IpPrefix {
        let address = IpAddr::from(octets);
        IpPrefix::new(address, len.min(32)).unwrap_or_else(|_| IpPrefix::host(address))
    }

    /// Destination of the plain forwarding scenarios.
    pub fn dst() -> IpPrefix {
        prefix_v4([198, 51, 100, 0], 24)
    }

    /// Tunnel endpoint destination of the decap/encap scenarios.
    pub fn vip_dst() -> IpPrefix {
        IpPrefix::host(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)))
    }

    pub fn outer() -> OuterHeader {
        OuterHeader::new(
            IpAddr::V4(Ipv4Addr::new(198, 18, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(203, 0, 113, 100)),
        )
    }

    /// Neighbor address on port `n`.
    pub fn neighbor(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, n))
    }

    pub fn mac(n: u8) -> MacAddress {
        MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, n])
    }
}

pub fn port(n: u8) -> String {
    format!("port{n}")
}

/// One forward next-hop per `(index, port, weight)` grouped into NHG `id`,
/// with `prefix` pointing at it.
pub fn weighted_route(
    ids: &mut OpIds,
    network_instance: &str,
    id: u64,
    prefix: IpPrefix,
    members: &[(u64, u8, u64)],
) -> Vec<AftOperation> {
    let mut ops = Vec::with_capacity(members.len() + 2);
    let mut group = NextHopGroupEntry::new(network_instance, id);
    for (index, port_no, weight) in members {
        ops.push(ids.add(NextHopEntry::forward(network_instance, *index, port(*port_no))));
        group = group.with_member(*index, *weight);
    }
    ops.push(ids.add(group));
    ops.push(ids.add(PrefixEntry::new(network_instance, prefix, id)));
    ops
}

/// NH#1 out of `port2`, NHG#1 = {NH#1: 100}, prefix 198.51.100.0/24.
pub fn scenario_a(ids: &mut OpIds) -> Vec<AftOperation> {
    weighted_route(ids, DEFAULT, 1, addr::dst(), &[(1, 2, 100)])
}

/// Forward to a VIP with a decap backup.
///
/// - NHG#100 = {NH#100: decap into DEFAULT}
/// - NHG#101 = {NH#101: forward out `port2`, weight 100}, backup NHG#100
/// - 203.0.113.1/32 in VRF-A -> NHG#101
/// - 203.0.113.1/32 in DEFAULT -> NHG#200 = {NH#200: forward out `port3`}
pub fn scenario_b(ids: &mut OpIds) -> Vec<AftOperation> {
    vec![
        ids.add(NextHopEntry::decap(DEFAULT, 100, DEFAULT)),
        ids.add(NextHopGroupEntry::new(DEFAULT, 100).with_member(100, 1)),
        ids.add(
            NextHopEntry::forward(DEFAULT, 101, port(2))
                .with_ip_address(addr::neighbor(2))
                .with_mac_address(addr::mac(2)),
        ),
        ids.add(NextHopGroupEntry::new(DEFAULT, 101).with_member(101, 100).with_backup(100)),
        ids.add(PrefixEntry::new(VRF_A, addr::vip_dst(), 101).with_nhg_network_instance(DEFAULT)),
        ids.add(NextHopEntry::forward(DEFAULT, 200, port(3))),
        ids.add(NextHopGroupEntry::new(DEFAULT, 200).with_member(200, 1)),
        ids.add(PrefixEntry::new(DEFAULT, addr::vip_dst(), 200)),
    ]
}

/// Name of the `n`th VRF used by scale fixtures.
pub fn scale_vrf(n: usize) -> NetworkInstance {
    NetworkInstance::new(format!("VRF-{n}"))
}

/// Adds and deletes for a scale run.
#[derive(Debug, Clone)]
pub struct ScaleBatch {
    pub adds: Vec<AftOperation>,
    /// Everything in `adds`, in reverse dependency order.
    pub deletes: Vec<AftEntry>,
}

impl ScaleBatch {
    pub fn delete_ops(&self, ids: &mut OpIds) -> Vec<AftOperation> {
        self.deletes.iter().map(|e| ids.delete(e.clone())).collect()
    }

    pub fn entry_count(&self) -> usize {
        self.adds.len()
    }
}

/// `prefix_count` host routes spread round-robin over
/// `network_instances` VRFs, sharing a pool of `nhg_pool` groups in
/// DEFAULT. Each group has one next-hop on ports 1..=8.
pub fn scale_batch(ids: &mut OpIds, scale: &ScaleConfig) -> ScaleBatch {
    let pool = scale.nhg_pool.max(1) as u64;
    let vrfs = scale.network_instances.max(1);

    let mut next_hops = Vec::new();
    let mut groups = Vec::new();
    for id in 1..=pool {
        let port_no = (id % 8 + 1) as u8;
        next_hops.push(AftEntry::from(NextHopEntry::forward(DEFAULT, id, port(port_no))));
        groups.push(AftEntry::from(NextHopGroupEntry::new(DEFAULT, id).with_member(id, 1)));
    }
    let prefixes: Vec<AftEntry> = (0..scale.prefix_count)
        .map(|i| {
            let address = IpAddr::V4(Ipv4Addr::from(0x0a00_0000u32 + i as u32));
            PrefixEntry::new(scale_vrf(i % vrfs), IpPrefix::host(address), i as u64 % pool + 1)
                .with_nhg_network_instance(DEFAULT)
                .into()
        })
        .collect();

    let adds = next_hops
        .iter()
        .chain(&groups)
        .chain(&prefixes)
        .map(|e| ids.add(e.clone()))
        .collect();
    let deletes = prefixes.into_iter().chain(groups).chain(next_hops).collect();
    ScaleBatch { adds, deletes }
}
