//! Wires the tables, programming log, viability monitor, resolution
//! engine and validators into one handle.
//!
//! Everything that used to be a process-wide knob (scale, traffic checks,
//! tolerance) arrives through the [`AftConfig`] passed to the constructor.

use crate::aft::{AftTables, SharedTables};
use crate::config::AftConfig;
use crate::error::{AftError, Result};
use crate::external::{
    paths, DeviceConfigService, FlowSpec, PacketCaptureReader, TrafficConfig, TrafficGenerator,
};
use crate::programming::{FibProgrammer, InMemoryFib, Persistence, ProgrammingLog, Session};
use crate::resolve::{ResolutionEngine, ResolutionResult};
use crate::validate::{
    validate_headers, HeaderExpectation, HeaderReport, TrafficObservation, TrafficValidator,
    ValidationReport,
};
use crate::viability::{Liveness, SharedLiveness, ViabilityChange, ViabilityMonitor};
use aft_common::RetryPolicy;
use aft_types::{IpPrefix, NetworkInstance, OperState};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

pub struct Harness {
    config: AftConfig,
    tables: SharedTables,
    liveness: SharedLiveness,
    log: ProgrammingLog,
    monitor: ViabilityMonitor,
    engine: ResolutionEngine,
    validator: TrafficValidator,
}

impl Harness {
    /// Builds a harness over an in-memory forwarding plane sized by
    /// `programming.fib_capacity`.
    pub fn new(config: AftConfig) -> Result<Self> {
        let fib = InMemoryFib::new().with_capacity(config.programming.fib_capacity);
        Self::with_fib(config, Arc::new(fib))
    }

    pub fn with_fib(config: AftConfig, fib: Arc<dyn FibProgrammer>) -> Result<Self> {
        config.validate()?;
        let validator = TrafficValidator::new(config.validation.tolerance)?;

        let tables = AftTables::shared();
        let liveness = Liveness::shared();
        let log = ProgrammingLog::new(
            tables.clone(),
            liveness.clone(),
            fib,
            config.programming.clone(),
        );
        let monitor = ViabilityMonitor::new(tables.clone(), liveness.clone());
        let engine = ResolutionEngine::new(tables.clone(), config.resolution.max_depth);

        info!(
            "Harness: ready (ack_mode={:?}, max_depth={}, tolerance={})",
            config.programming.ack_mode, config.resolution.max_depth, config.validation.tolerance
        );
        Ok(Self {
            config,
            tables,
            liveness,
            log,
            monitor,
            engine,
            validator,
        })
    }

    pub fn config(&self) -> &AftConfig {
        &self.config
    }

    pub fn tables(&self) -> &SharedTables {
        &self.tables
    }

    pub fn liveness(&self) -> &SharedLiveness {
        &self.liveness
    }

    pub fn log(&self) -> &ProgrammingLog {
        &self.log
    }

    pub fn monitor(&self) -> &ViabilityMonitor {
        &self.monitor
    }

    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    pub fn validator(&self) -> &TrafficValidator {
        &self.validator
    }

    /// A session with the configured persistence and ack mode.
    pub fn open_session(&self) -> Session {
        self.open_session_with(self.config.programming.persistence)
    }

    pub fn open_session_with(&self, persistence: Persistence) -> Session {
        Session::new(self.log.clone(), persistence, self.config.programming.ack_mode)
    }

    pub fn resolve(
        &self,
        network_instance: &NetworkInstance,
        prefix: &IpPrefix,
    ) -> ResolutionResult {
        self.engine.resolve(network_instance, prefix)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.convergence.attempts, self.config.convergence_interval())
    }

    /// Re-resolves until `predicate` holds.
    ///
    /// Fails with [`AftError::ConvergenceFailure`] carrying the last
    /// result once the retry budget runs out.
    pub async fn await_resolution<P>(
        &self,
        network_instance: &NetworkInstance,
        prefix: &IpPrefix,
        predicate: P,
    ) -> Result<ResolutionResult>
    where
        P: Fn(&ResolutionResult) -> bool,
    {
        self.retry_policy()
            .poll_until(|| self.resolve(network_instance, prefix), predicate)
            .await
            .map_err(|exhausted| {
                warn!(
                    "Harness: {}/{} did not converge: {}",
                    network_instance, prefix, exhausted.last
                );
                AftError::ConvergenceFailure {
                    network_instance: network_instance.to_string(),
                    prefix: prefix.to_string(),
                    attempts: exhausted.attempts,
                    detail: exhausted.last.to_string(),
                }
            })
    }

    /// Reads interface and neighbor state from the device and feeds it to
    /// the viability monitor.
    ///
    /// A missing or unparsable oper-status counts as down and a missing
    /// resolved flag as unresolved.
    pub async fn seed_from_device(
        &self,
        device: &dyn DeviceConfigService,
        interfaces: &[&str],
        neighbors: &[IpAddr],
    ) -> Result<Vec<ViabilityChange>> {
        let mut changes = Vec::new();
        for name in interfaces {
            let state = device
                .get(&paths::interface_oper_status(name))
                .await?
                .and_then(|v| v.as_str().and_then(|s| s.parse::<OperState>().ok()))
                .unwrap_or(OperState::Down);
            debug!("Harness: seeded interface {} as {}", name, state);
            changes.extend(self.monitor.set_interface_oper_state(name, state));
        }
        for ip in neighbors {
            let resolved = device
                .get(&paths::neighbor_resolved(*ip))
                .await?
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            changes.extend(self.monitor.set_neighbor_resolved(*ip, resolved));
        }
        Ok(changes)
    }

    /// Sends `flow` through the generator and collects per-port receive
    /// counters.
    pub async fn run_flow(
        &self,
        generator: &dyn TrafficGenerator,
        flow: FlowSpec,
        ports: &[String],
    ) -> Result<TrafficObservation> {
        let name = flow.name.clone();
        let config = ports
            .iter()
            .fold(TrafficConfig::default().with_flow(flow), |c, p| c.with_port(p.as_str()));
        generator.push_config(&config).await?;
        generator.start_protocols().await?;
        generator.start_traffic().await?;
        generator.stop_traffic().await?;

        let sent = generator.counters(&name).await?.out_pkts;
        let mut observation = TrafficObservation::new(sent);
        for port in generator.ports().await? {
            let received = generator.counters(&port).await?.in_pkts;
            if received > 0 {
                observation = observation.with_egress(port, received);
            }
        }
        Ok(observation)
    }

    /// Judges an observation against the split `result` predicts. An
    /// unresolved result expects total loss.
    pub fn verify_traffic(
        &self,
        result: &ResolutionResult,
        observation: &TrafficObservation,
    ) -> Result<ValidationReport> {
        let report = self
            .validator
            .validate(observation, &result.ratios(), result.unresolved)?;
        debug!("Harness: {}", report);
        Ok(report)
    }

    /// Resolves, sends `packets_per_flow` packets and validates the split.
    ///
    /// Returns `None` when traffic checks are disabled.
    pub async fn verify_flow(
        &self,
        generator: &dyn TrafficGenerator,
        network_instance: &NetworkInstance,
        prefix: &IpPrefix,
        ports: &[String],
    ) -> Result<Option<ValidationReport>> {
        if !self.config.validation.traffic_checks {
            info!("Harness: traffic checks disabled, skipping {}/{}", network_instance, prefix);
            return Ok(None);
        }
        let result = self.resolve(network_instance, prefix);
        let flow = FlowSpec::new(
            format!("{network_instance}-{prefix}"),
            network_instance.clone(),
            *prefix,
            self.config.validation.packets_per_flow,
        );
        let observation = self.run_flow(generator, flow, ports).await?;
        self.verify_traffic(&result, &observation).map(Some)
    }

    /// Checks captured headers on every egress interface of `result`, one
    /// report per interface.
    pub async fn verify_headers(
        &self,
        capture: &dyn PacketCaptureReader,
        result: &ResolutionResult,
    ) -> Result<Vec<(String, HeaderReport)>> {
        let ports: BTreeSet<String> = result.egress.iter().map(|e| e.label()).collect();
        let mut reports = Vec::with_capacity(ports.len());
        for port in ports {
            let packets = capture.packets(&port).await?;
            let report = validate_headers(&packets, &HeaderExpectation::for_port(result, &port));
            reports.push((port, report));
        }
        Ok(reports)
    }
}
