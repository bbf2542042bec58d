//! Resolution results.

use crate::aft::{NextHopKey, NextHopKind, NhgKey, OuterHeader};
use aft_types::{IpPrefix, MacAddress, NetworkInstance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// A forward next-hop the destination egresses through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Egress {
    pub next_hop: NextHopKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<MacAddress>,
    /// Outer header pushed on the way here, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_header: Option<OuterHeader>,
    /// Relative weight over a denominator common to the whole result.
    pub weight: u128,
}

impl Egress {
    /// Interface name if known, otherwise the next-hop key.
    pub fn label(&self) -> String {
        self.interface
            .clone()
            .unwrap_or_else(|| self.next_hop.to_string())
    }
}

/// One step of the resolution walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PathStep {
    /// Exact-match lookup of the destination in a network instance.
    Lookup {
        network_instance: NetworkInstance,
        prefix: IpPrefix,
    },
    Group {
        key: NhgKey,
    },
    /// Every member of `primary` was unviable; `backup` takes over.
    BackupActivated {
        primary: NhgKey,
        backup: NhgKey,
    },
    NextHop {
        key: NextHopKey,
        kind: NextHopKind,
        /// Configured member weight in the enclosing group.
        weight: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outer_header: Option<OuterHeader>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inner_network_instance: Option<NetworkInstance>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathHop {
    /// Backup hops plus nested lookups taken to reach this step.
    pub depth: u32,
    pub step: PathStep,
}

/// Why (part of) a resolution produced no egress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoPrefixEntry {
        network_instance: NetworkInstance,
        prefix: IpPrefix,
    },
    MissingGroup {
        key: NhgKey,
    },
    /// No viable member and no backup to fall back to.
    NoViableMembers {
        key: NhgKey,
    },
    BackupCycle {
        key: NhgKey,
    },
    /// A nested lookup would revisit a network instance already on the path.
    LookupLoop {
        network_instance: NetworkInstance,
    },
    DepthExhausted {
        max_depth: u32,
    },
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NoPrefixEntry {
                network_instance,
                prefix,
            } => write!(f, "no prefix entry for {prefix} in {network_instance}"),
            UnresolvedReason::MissingGroup { key } => write!(f, "group {key} does not exist"),
            UnresolvedReason::NoViableMembers { key } => {
                write!(f, "group {key} has no viable member and no backup")
            }
            UnresolvedReason::BackupCycle { key } => write!(f, "backup chain cycles at {key}"),
            UnresolvedReason::LookupLoop { network_instance } => {
                write!(f, "nested lookup loops back into {network_instance}")
            }
            UnresolvedReason::DepthExhausted { max_depth } => {
                write!(f, "depth budget of {max_depth} exhausted")
            }
        }
    }
}

/// Outcome of resolving one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub network_instance: NetworkInstance,
    pub prefix: IpPrefix,
    pub path: Vec<PathHop>,
    pub egress: Vec<Egress>,
    /// True when no viable egress exists after exhausting all backups.
    pub unresolved: bool,
    /// Dead ends met during the walk. May be non-empty for a resolved
    /// result when only some branches failed.
    pub failures: Vec<UnresolvedReason>,
}

impl ResolutionResult {
    pub fn total_weight(&self) -> u128 {
        self.egress.iter().fold(0u128, |acc, e| acc.saturating_add(e.weight))
    }

    /// Expected traffic share per egress label, summing to 1.
    ///
    /// Egresses sharing a label (same interface reached through different
    /// paths) are merged.
    pub fn ratios(&self) -> BTreeMap<String, f64> {
        let total = self.total_weight();
        let mut ratios = BTreeMap::new();
        if total == 0 {
            return ratios;
        }
        for egress in &self.egress {
            *ratios.entry(egress.label()).or_insert(0.0) += egress.weight as f64 / total as f64;
        }
        ratios
    }

    /// Expected traffic share per egress next-hop.
    pub fn next_hop_ratios(&self) -> BTreeMap<NextHopKey, f64> {
        let total = self.total_weight();
        let mut ratios = BTreeMap::new();
        if total == 0 {
            return ratios;
        }
        for egress in &self.egress {
            *ratios.entry(egress.next_hop.clone()).or_insert(0.0) +=
                egress.weight as f64 / total as f64;
        }
        ratios
    }

    /// Groups whose backup took over during the walk.
    pub fn activated_backups(&self) -> Vec<&NhgKey> {
        self.path
            .iter()
            .filter_map(|hop| match &hop.step {
                PathStep::BackupActivated { backup, .. } => Some(backup),
                _ => None,
            })
            .collect()
    }

    pub fn backup_activated(&self) -> bool {
        !self.activated_backups().is_empty()
    }

    /// Network instances looked up, in walk order.
    pub fn lookups(&self) -> Vec<(&NetworkInstance, &IpPrefix)> {
        self.path
            .iter()
            .filter_map(|hop| match &hop.step {
                PathStep::Lookup {
                    network_instance,
                    prefix,
                } => Some((network_instance, prefix)),
                _ => None,
            })
            .collect()
    }

    /// Next-hops of the given kind traversed by the walk.
    pub fn next_hops_of_kind(&self, kind: NextHopKind) -> Vec<&NextHopKey> {
        self.path
            .iter()
            .filter_map(|hop| match &hop.step {
                PathStep::NextHop { key, kind: k, .. } if *k == kind => Some(key),
                _ => None,
            })
            .collect()
    }

    /// First reason the walk failed, if it did not resolve.
    pub fn reason(&self) -> Option<&UnresolvedReason> {
        if self.unresolved {
            self.failures.first()
        } else {
            None
        }
    }
}

impl fmt::Display for ResolutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: ", self.network_instance, self.prefix)?;
        if self.unresolved {
            return match self.reason() {
                Some(reason) => write!(f, "unresolved ({reason})"),
                None => write!(f, "unresolved"),
            };
        }
        let parts: Vec<String> = self
            .ratios()
            .into_iter()
            .map(|(label, ratio)| format!("{label}={ratio:.3}"))
            .collect();
        write!(f, "{}", parts.join(" "))?;
        if self.backup_activated() {
            write!(f, " [backup]")?;
        }
        Ok(())
    }
}
