//! Scenario files for `aftd`.
//!
//! A scenario seeds liveness, then runs an ordered list of steps against a
//! [`Harness`] through one leader session.

use crate::aft::{AftOperation, EntryFilter};
use crate::error::{AftError, Result};
use crate::harness::Harness;
use crate::resolve::ResolutionResult;
use crate::viability::ViabilityChange;
use aft_types::{IpPrefix, NetworkInstance};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Interface {
        name: String,
        up: bool,
    },
    Neighbor {
        ip: IpAddr,
        resolved: bool,
    },
    Program {
        operations: Vec<AftOperation>,
    },
    /// Flushes one network instance, or everything when unset.
    Flush {
        #[serde(default)]
        network_instance: Option<NetworkInstance>,
    },
    Resolve {
        #[serde(default)]
        network_instance: NetworkInstance,
        prefix: IpPrefix,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Initial interface states, name to up.
    #[serde(default)]
    pub interfaces: BTreeMap<String, bool>,
    /// Initial neighbor resolution states.
    #[serde(default)]
    pub neighbors: BTreeMap<IpAddr, bool>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| AftError::Serialization(format!("{}: {}", path.display(), e)))
    }

    pub async fn run(&self, harness: &Harness) -> Result<ScenarioReport> {
        for (name, up) in &self.interfaces {
            harness.monitor().set_interface_state(name, *up);
        }
        for (ip, resolved) in &self.neighbors {
            harness.monitor().set_neighbor_resolved(*ip, *resolved);
        }

        let mut session = harness.open_session();
        session.become_leader();

        let mut outcomes = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let outcome = match step {
                Step::Interface { name, up } => StepOutcome::Viability {
                    changes: harness.monitor().set_interface_state(name, *up),
                },
                Step::Neighbor { ip, resolved } => StepOutcome::Viability {
                    changes: harness.monitor().set_neighbor_resolved(*ip, *resolved),
                },
                Step::Program { operations } => {
                    let results = session.modify(operations.clone()).await;
                    StepOutcome::Programmed {
                        failed: results.iter().filter(|r| !r.is_success()).count(),
                        results: results.iter().map(ToString::to_string).collect(),
                    }
                }
                Step::Flush { network_instance } => {
                    let filter = match network_instance {
                        Some(ni) => EntryFilter::network_instance(ni.clone()),
                        None => EntryFilter::all(),
                    };
                    StepOutcome::Flushed {
                        removed: session.flush(&filter, false)?,
                    }
                }
                Step::Resolve {
                    network_instance,
                    prefix,
                } => StepOutcome::Resolved {
                    result: harness.resolve(network_instance, prefix),
                },
            };
            outcomes.push(outcome);
        }

        let removed = session.close();
        info!("Scenario: {} steps run, {} entries removed on close", outcomes.len(), removed);
        Ok(ScenarioReport { outcomes })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Viability { changes: Vec<ViabilityChange> },
    Programmed { results: Vec<String>, failed: usize },
    Flushed { removed: usize },
    Resolved { result: ResolutionResult },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub outcomes: Vec<StepOutcome>,
}

impl ScenarioReport {
    pub fn resolutions(&self) -> impl Iterator<Item = &ResolutionResult> {
        self.outcomes.iter().filter_map(|o| match o {
            StepOutcome::Resolved { result } => Some(result),
            _ => None,
        })
    }

    pub fn failed_operations(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                StepOutcome::Programmed { failed, .. } => *failed,
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, outcome) in self.outcomes.iter().enumerate() {
            match outcome {
                StepOutcome::Viability { changes } => {
                    writeln!(f, "[{i}] viability: {} next-hops changed", changes.len())?
                }
                StepOutcome::Programmed { results, failed } => {
                    writeln!(f, "[{i}] programmed {} ops, {} failed", results.len(), failed)?;
                    for result in results {
                        writeln!(f, "      {result}")?;
                    }
                }
                StepOutcome::Flushed { removed } => writeln!(f, "[{i}] flushed {removed} entries")?,
                StepOutcome::Resolved { result } => writeln!(f, "[{i}] {result}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AftConfig;
    use crate::programming::AckMode;
    use pretty_assertions::assert_eq;

    const SCENARIO_A: &str = r#"{
        "interfaces": {"port2": true},
        "steps": [
            {"step": "program", "operations": [
                {"id": 1, "op": "add", "entry": {"type": "next_hop",
                    "key": {"network_instance": "DEFAULT", "index": 1},
                    "action": {"kind": "forward", "interface": "port2"}}},
                {"id": 2, "op": "add", "entry": {"type": "next_hop_group",
                    "key": {"network_instance": "DEFAULT", "id": 1},
                    "members": [{
                        "next_hop": {"network_instance": "DEFAULT", "index": 1},
                        "weight": 100
                    }]}},
                {"id": 3, "op": "add", "entry": {"type": "prefix",
                    "key": {"network_instance": "DEFAULT", "prefix": "198.51.100.0/24"},
                    "next_hop_group": {"network_instance": "DEFAULT", "id": 1}}}
            ]},
            {"step": "resolve", "prefix": "198.51.100.0/24"},
            {"step": "interface", "name": "port2", "up": false},
            {"step": "resolve", "prefix": "198.51.100.0/24"}
        ]
    }"#;

    #[tokio::test]
    async fn test_scenario_a_from_json() {
        let scenario: Scenario = serde_json::from_str(SCENARIO_A).unwrap();
        let mut config = AftConfig::default();
        config.programming.ack_mode = AckMode::Rib;
        let harness = Harness::new(config).unwrap();

        let report = scenario.run(&harness).await.unwrap();
        assert_eq!(report.failed_operations(), 0);

        let resolutions: Vec<_> = report.resolutions().collect();
        assert_eq!(resolutions.len(), 2);
        assert_eq!(resolutions[0].ratios().get("port2"), Some(&1.0));
        assert!(resolutions[1].unresolved);
        assert!(report.to_string().contains("unresolved"));
    }

    #[test]
    fn test_load_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Scenario::load(&path), Err(AftError::Serialization(_))));
    }
}
