//! Collaborators the engine consumes but does not implement.
//!
//! The device configuration service seeds interface and neighbor state,
//! the traffic generator produces counters for the distribution validator
//! and the packet capture reader yields decoded headers for encap/decap
//! checks. Production backends and the simulations in `aft-test` both
//! implement these traits.

use crate::aft::OuterHeader;
use crate::error::{AftError, Result};
use aft_types::{IpPrefix, MacAddress, NetworkInstance};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Poll interval used by [`DeviceConfigService::await_value`].
pub const AWAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Device configuration paths read when seeding liveness.
pub mod paths {
    use std::net::IpAddr;

    pub fn interface_oper_status(name: &str) -> String {
        format!("/interfaces/interface[name={name}]/state/oper-status")
    }

    pub fn neighbor_resolved(ip: IpAddr) -> String {
        format!("/neighbors/neighbor[ip={ip}]/state/resolved")
    }
}

/// Declarative configuration tree of the device under test.
#[async_trait]
pub trait DeviceConfigService: Send + Sync {
    async fn replace(&self, path: &str, value: Value) -> Result<()>;

    /// Merges `value` into whatever is stored at `path`.
    async fn update(&self, path: &str, value: Value) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Current value at `path`, `None` when nothing is configured there.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Polls `path` until `predicate` accepts its value.
    ///
    /// Returns [`AftError::Timeout`] when `timeout` elapses first.
    async fn await_value(
        &self,
        path: &str,
        timeout: Duration,
        predicate: &(dyn for<'v> Fn(&'v Value) -> bool + Send + Sync),
    ) -> Result<Value> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.get(path).await? {
                if predicate(&value) {
                    return Ok(value);
                }
            }
            if Instant::now() >= deadline {
                return Err(AftError::timeout(path, timeout));
            }
            tokio::time::sleep(AWAIT_POLL_INTERVAL).await;
        }
    }
}

/// One generated flow: packets towards `destination` entering the device
/// in `network_instance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub name: String,
    pub network_instance: NetworkInstance,
    pub destination: IpPrefix,
    pub packets: u64,
}

impl FlowSpec {
    pub fn new(
        name: impl Into<String>,
        network_instance: impl Into<NetworkInstance>,
        destination: IpPrefix,
        packets: u64,
    ) -> Self {
        Self {
            name: name.into(),
            network_instance: network_instance.into(),
            destination,
            packets,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficConfig {
    pub flows: Vec<FlowSpec>,
    /// Egress ports the generator listens on.
    pub ports: Vec<String>,
}

impl TrafficConfig {
    pub fn with_flow(mut self, flow: FlowSpec) -> Self {
        self.flows.push(flow);
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.ports.push(port.into());
        self
    }
}

/// Counters for a flow or a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortCounters {
    pub out_pkts: u64,
    pub in_pkts: u64,
}

#[async_trait]
pub trait TrafficGenerator: Send + Sync {
    async fn push_config(&self, config: &TrafficConfig) -> Result<()>;

    async fn start_protocols(&self) -> Result<()>;

    async fn start_traffic(&self) -> Result<()>;

    async fn stop_traffic(&self) -> Result<()>;

    /// Counters for a flow name or a port name.
    async fn counters(&self, flow_or_port: &str) -> Result<PortCounters>;

    /// Ports configured by the last [`push_config`](Self::push_config).
    async fn ports(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetHeader {
    pub src: MacAddress,
    pub dst: MacAddress,
    pub ether_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpHeader {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub ttl: u8,
    /// IPv4 protocol or IPv6 next header.
    pub protocol: u8,
}

impl IpHeader {
    pub const PROTO_IPV4_IN_IP: u8 = 4;
    pub const PROTO_IPV6_IN_IP: u8 = 41;
    pub const PROTO_UDP: u8 = 17;

    pub fn new(src: IpAddr, dst: IpAddr, protocol: u8) -> Self {
        Self {
            src,
            dst,
            ttl: 64,
            protocol,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.dst.is_ipv6()
    }

    pub fn as_outer_header(&self) -> OuterHeader {
        OuterHeader::new(self.src, self.dst)
    }
}

/// A captured frame decoded into layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPacket {
    pub ethernet: EthernetHeader,
    /// IP headers, outermost first.
    pub ip: Vec<IpHeader>,
}

impl DecodedPacket {
    pub fn new(ethernet: EthernetHeader, ip: Vec<IpHeader>) -> Self {
        Self { ethernet, ip }
    }

    /// The tunnel header, present only when the packet is encapsulated.
    pub fn outer(&self) -> Option<&IpHeader> {
        match self.ip.as_slice() {
            [outer, _, ..] => Some(outer),
            _ => None,
        }
    }

    pub fn inner(&self) -> Option<&IpHeader> {
        self.ip.last()
    }

    pub fn is_encapsulated(&self) -> bool {
        self.ip.len() > 1
    }
}

#[async_trait]
pub trait PacketCaptureReader: Send + Sync {
    /// Packets captured on `port` since the last call.
    async fn packets(&self, port: &str) -> Result<Vec<DecodedPacket>>;
}
