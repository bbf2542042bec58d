//! In-memory stand-ins for the device, traffic generator and capture.

use aft_orch::external::{
    DecodedPacket, DeviceConfigService, EthernetHeader, FlowSpec, IpHeader, PacketCaptureReader,
    PortCounters, TrafficConfig, TrafficGenerator,
};
use aft_orch::resolve::ResolutionEngine;
use aft_orch::{AftError, Result};
use aft_types::MacAddress;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const GENERATOR: &str = "traffic generator";

/// Device configuration tree kept in a map keyed by path.
#[derive(Debug, Default)]
pub struct InMemoryDeviceConfig {
    values: Mutex<BTreeMap<String, Value>>,
}

impl InMemoryDeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

#[async_trait]
impl DeviceConfigService for InMemoryDeviceConfig {
    async fn replace(&self, path: &str, value: Value) -> Result<()> {
        self.values.lock().insert(path.to_string(), value);
        Ok(())
    }

    async fn update(&self, path: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock();
        match (values.get_mut(path), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => existing.extend(incoming),
            (_, value) => {
                values.insert(path.to_string(), value);
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.values.lock().remove(path);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().get(path).cloned())
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    config: Option<TrafficConfig>,
    protocols_started: bool,
    flows: BTreeMap<String, PortCounters>,
    ports: BTreeMap<String, PortCounters>,
    captures: BTreeMap<String, Vec<DecodedPacket>>,
}

/// Traffic generator that forwards packets along live resolution
/// results.
///
/// Each packet of a flow picks an egress with probability proportional to
/// its resolved weight, so observed splits approximate the expected ratios
/// the way hashed ECMP does. A fixed seed keeps runs reproducible.
pub struct SimulatedTrafficGenerator {
    engine: ResolutionEngine,
    rng: Mutex<StdRng>,
    loss: f64,
    capture_limit: usize,
    state: Mutex<GeneratorState>,
}

impl SimulatedTrafficGenerator {
    pub const DEFAULT_SEED: u64 = 0x5eed;
    pub const DEFAULT_CAPTURE_LIMIT: usize = 64;

    pub fn new(engine: ResolutionEngine) -> Self {
        Self::with_seed(engine, Self::DEFAULT_SEED)
    }

    pub fn with_seed(engine: ResolutionEngine, seed: u64) -> Self {
        Self {
            engine,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            loss: 0.0,
            capture_limit: Self::DEFAULT_CAPTURE_LIMIT,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    /// Drops each packet with probability `loss` before it reaches the
    /// device.
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = loss.clamp(0.0, 1.0);
        self
    }

    /// Packets retained per port for [`PacketCaptureReader::packets`].
    pub fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    fn send_flow(&self, flow: &FlowSpec, state: &mut GeneratorState) -> Result<()> {
        let result = self.engine.resolve(&flow.network_instance, &flow.destination);
        state.flows.entry(flow.name.clone()).or_default().out_pkts += flow.packets;
        if result.egress.is_empty() {
            debug!("SimulatedTrafficGenerator: {} blackholed ({})", flow.name, result);
            return Ok(());
        }

        let weights: Vec<f64> = result.egress.iter().map(|e| e.weight as f64).collect();
        let picker =
            WeightedIndex::new(&weights).map_err(|e| AftError::external(GENERATOR, e.to_string()))?;
        let inner = inner_header(flow);

        let mut rng = self.rng.lock();
        for _ in 0..flow.packets {
            if self.loss > 0.0 && rng.gen_bool(self.loss) {
                continue;
            }
            let egress = &result.egress[picker.sample(&mut *rng)];
            let port = egress.label();
            state.flows.entry(flow.name.clone()).or_default().in_pkts += 1;
            state.ports.entry(port.clone()).or_default().in_pkts += 1;

            let captured = state.captures.entry(port).or_default();
            if captured.len() < self.capture_limit {
                let mut ip = Vec::with_capacity(2);
                if let Some(outer) = egress.outer_header {
                    let protocol = if inner.is_ipv6() {
                        IpHeader::PROTO_IPV6_IN_IP
                    } else {
                        IpHeader::PROTO_IPV4_IN_IP
                    };
                    ip.push(IpHeader::new(outer.src, outer.dst, protocol));
                }
                ip.push(inner);
                let ethernet = EthernetHeader {
                    src: MacAddress::new([0x02, 0, 0, 0, 0, 0xfe]),
                    dst: egress.mac_address.unwrap_or(MacAddress::ZERO),
                    ether_type: if ip[0].is_ipv6() { 0x86dd } else { 0x0800 },
                };
                captured.push(DecodedPacket::new(ethernet, ip));
            }
        }
        Ok(())
    }
}

fn inner_header(flow: &FlowSpec) -> IpHeader {
    let src = if flow.destination.is_ipv6() {
        IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1))
    } else {
        IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1))
    };
    IpHeader::new(src, flow.destination.address(), IpHeader::PROTO_UDP)
}

#[async_trait]
impl TrafficGenerator for SimulatedTrafficGenerator {
    async fn push_config(&self, config: &TrafficConfig) -> Result<()> {
        let mut state = self.state.lock();
        *state = GeneratorState {
            config: Some(config.clone()),
            ..GeneratorState::default()
        };
        for port in &config.ports {
            state.ports.insert(port.clone(), PortCounters::default());
        }
        Ok(())
    }

    async fn start_protocols(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.config.is_none() {
            return Err(AftError::external(GENERATOR, "no configuration pushed"));
        }
        state.protocols_started = true;
        Ok(())
    }

    /// Sends every configured flow to completion.
    async fn start_traffic(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.protocols_started {
            return Err(AftError::external(GENERATOR, "protocols not started"));
        }
        let flows = state.config.as_ref().map(|c| c.flows.clone()).unwrap_or_default();
        for flow in &flows {
            self.send_flow(flow, &mut state)?;
        }
        Ok(())
    }

    async fn stop_traffic(&self) -> Result<()> {
        Ok(())
    }

    async fn counters(&self, flow_or_port: &str) -> Result<PortCounters> {
        let state = self.state.lock();
        state
            .flows
            .get(flow_or_port)
            .or_else(|| state.ports.get(flow_or_port))
            .copied()
            .ok_or_else(|| {
                AftError::external(GENERATOR, format!("unknown flow or port {flow_or_port}"))
            })
    }

    async fn ports(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().ports.keys().cloned().collect())
    }
}

#[async_trait]
impl PacketCaptureReader for SimulatedTrafficGenerator {
    async fn packets(&self, port: &str) -> Result<Vec<DecodedPacket>> {
        Ok(self.state.lock().captures.remove(port).unwrap_or_default())
    }
}
