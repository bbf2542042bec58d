//! Resolution engine.
//!
//! Walks prefix -> group -> next-hop chains without recursion. Each
//! backup hop and each nested (decap/encap) lookup spends one unit of the
//! depth budget. Backup cycles are caught by a per-chain visited set and
//! lookup loops by the list of network instances already on the branch.

use super::result::{Egress, PathHop, PathStep, ResolutionResult, UnresolvedReason};
use crate::aft::{
    AftTables, NextHopAction, NextHopRecord, NhgKey, OuterHeader, PrefixKey, SharedTables,
};
use aft_types::{IpPrefix, NetworkInstance};
use log::debug;
use std::collections::BTreeSet;

/// Read-through resolver over the shared tables. Holds no cache.
#[derive(Clone)]
pub struct ResolutionEngine {
    tables: SharedTables,
    max_depth: u32,
}

impl ResolutionEngine {
    pub fn new(tables: SharedTables, max_depth: u32) -> Self {
        Self { tables, max_depth }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Resolves `prefix` in `network_instance` against the current tables.
    pub fn resolve(
        &self,
        network_instance: &NetworkInstance,
        prefix: &IpPrefix,
    ) -> ResolutionResult {
        let tables = self.tables.read();
        resolve_in(&tables, network_instance, prefix, self.max_depth)
    }
}

/// Fixed-point scale for egress weights when exact fractions overflow.
const APPROX_SCALE: f64 = (1u64 << 53) as f64;

/// Fraction of the traffic entering the walk.
///
/// `exact` is a reduced fraction and becomes `None` once a product no
/// longer fits in `u128`; `approx` is always tracked alongside it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Share {
    exact: Option<(u128, u128)>,
    approx: f64,
}

impl Share {
    const WHOLE: Share = Share {
        exact: Some((1, 1)),
        approx: 1.0,
    };

    /// This share split `weight` out of `total`.
    fn split(self, weight: u64, total: u128) -> Share {
        let exact = self.exact.and_then(|(num, den)| {
            let num = num.checked_mul(u128::from(weight))?;
            let den = den.checked_mul(total)?;
            let g = gcd(num, den).max(1);
            Some((num / g, den / g))
        });
        Share {
            exact,
            approx: self.approx * (weight as f64 / total as f64),
        }
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// A pending lookup on the walk stack.
struct Frame {
    network_instance: NetworkInstance,
    share: Share,
    depth: u32,
    outer_header: Option<OuterHeader>,
    /// Network instances already looked up on this branch.
    ancestry: Vec<NetworkInstance>,
}

/// The group that supplies egress after any backup fallback.
struct ActiveGroup<'a> {
    depth: u32,
    members: Vec<(u64, &'a NextHopRecord)>,
}

/// Resolves against a table snapshot the caller already holds.
pub fn resolve_in(
    tables: &AftTables,
    network_instance: &NetworkInstance,
    prefix: &IpPrefix,
    max_depth: u32,
) -> ResolutionResult {
    let mut path = Vec::new();
    let mut leaves: Vec<(Egress, Share)> = Vec::new();
    let mut failures = Vec::new();

    let mut stack = vec![Frame {
        network_instance: network_instance.clone(),
        share: Share::WHOLE,
        depth: 0,
        outer_header: None,
        ancestry: Vec::new(),
    }];

    while let Some(frame) = stack.pop() {
        if frame.ancestry.contains(&frame.network_instance) {
            failures.push(UnresolvedReason::LookupLoop {
                network_instance: frame.network_instance,
            });
            continue;
        }
        path.push(PathHop {
            depth: frame.depth,
            step: PathStep::Lookup {
                network_instance: frame.network_instance.clone(),
                prefix: *prefix,
            },
        });

        let key = PrefixKey::new(frame.network_instance.clone(), *prefix);
        let Some(entry) = tables.prefix(&key) else {
            failures.push(UnresolvedReason::NoPrefixEntry {
                network_instance: frame.network_instance,
                prefix: *prefix,
            });
            continue;
        };

        let selected =
            select_group(tables, &entry.next_hop_group, frame.depth, max_depth, &mut path);
        let active = match selected {
            Ok(active) => active,
            Err(reason) => {
                failures.push(reason);
                continue;
            }
        };

        let total: u128 = active.members.iter().map(|(w, _)| u128::from(*w)).sum();
        let mut nested = Vec::new();
        for (weight, record) in active.members {
            let share = frame.share.split(weight, total);
            let action = &record.entry.action;
            path.push(PathHop {
                depth: active.depth,
                step: PathStep::NextHop {
                    key: record.entry.key.clone(),
                    kind: action.kind(),
                    weight,
                    outer_header: action.outer_header().copied(),
                    inner_network_instance: action.inner_network_instance().cloned(),
                },
            });

            match action {
                NextHopAction::Forward {
                    interface,
                    ip_address,
                    mac_address,
                } => leaves.push((
                    Egress {
                        next_hop: record.entry.key.clone(),
                        interface: interface.clone(),
                        ip_address: *ip_address,
                        mac_address: *mac_address,
                        outer_header: frame.outer_header,
                        weight: 0,
                    },
                    share,
                )),
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
                } => {
                    let depth = active.depth + 1;
                    if depth > max_depth {
                        failures.push(UnresolvedReason::DepthExhausted { max_depth });
                        continue;
                    }
                    // Decap strips any outer header; encap replaces it.
                    let outer_header = action.outer_header().copied();
                    let mut ancestry = frame.ancestry.clone();
                    ancestry.push(frame.network_instance.clone());
                    nested.push(Frame {
                        network_instance: inner_network_instance.clone(),
                        share,
                        depth,
                        outer_header,
                        ancestry,
                    });
                }
            }
        }
        // Reversed so nested lookups run in member order.
        stack.extend(nested.into_iter().rev());
    }

    let egress = weigh_egress(leaves);
    let unresolved = egress.is_empty();
    if unresolved {
        debug!(
            "ResolutionEngine: {}/{} unresolved: {:?}",
            network_instance, prefix, failures
        );
    }
    ResolutionResult {
        network_instance: network_instance.clone(),
        prefix: *prefix,
        path,
        egress,
        unresolved,
        failures,
    }
}

/// Finds the first group on the backup chain with a viable member.
fn select_group<'a>(
    tables: &'a AftTables,
    start: &NhgKey,
    mut depth: u32,
    max_depth: u32,
    path: &mut Vec<PathHop>,
) -> Result<ActiveGroup<'a>, UnresolvedReason> {
    let mut visited = BTreeSet::new();
    let mut current = start.clone();

    loop {
        if !visited.insert(current.clone()) {
            return Err(UnresolvedReason::BackupCycle { key: current });
        }
        let Some(group) = tables.next_hop_group(&current) else {
            return Err(UnresolvedReason::MissingGroup { key: current });
        };
        path.push(PathHop {
            depth,
            step: PathStep::Group {
                key: current.clone(),
            },
        });

        let members: Vec<(u64, &NextHopRecord)> = group
            .members
            .iter()
            .filter_map(|m| {
                tables
                    .next_hop(&m.next_hop)
                    .filter(|record| record.viable)
                    .map(|record| (m.weight, record))
            })
            .collect();
        if !members.is_empty() {
            return Ok(ActiveGroup { depth, members });
        }

        let Some(backup) = &group.backup else {
            return Err(UnresolvedReason::NoViableMembers { key: current });
        };
        depth += 1;
        if depth > max_depth {
            return Err(UnresolvedReason::DepthExhausted { max_depth });
        }
        path.push(PathHop {
            depth,
            step: PathStep::BackupActivated {
                primary: current.clone(),
                backup: backup.clone(),
            },
        });
        current = backup.clone();
    }
}

/// Turns leaf shares into integer weights and merges leaves that reach
/// the same next-hop with the same outer header.
///
/// Shares are scaled onto their common denominator when it fits in
/// `u128`; otherwise they are rounded onto a 2^53 fixed-point scale.
fn weigh_egress(leaves: Vec<(Egress, Share)>) -> Vec<Egress> {
    let weights = exact_weights(&leaves).unwrap_or_else(|| {
        debug!("ResolutionEngine: weight products overflow, using fixed-point shares");
        leaves
            .iter()
            .map(|(_, share)| ((share.approx * APPROX_SCALE).round() as u128).max(1))
            .collect()
    });

    let mut egress: Vec<Egress> = Vec::with_capacity(leaves.len());
    for ((mut leaf, _), weight) in leaves.into_iter().zip(weights) {
        leaf.weight = weight;
        match egress
            .iter_mut()
            .find(|e| e.next_hop == leaf.next_hop && e.outer_header == leaf.outer_header)
        {
            Some(existing) => existing.weight += leaf.weight,
            None => egress.push(leaf),
        }
    }
    egress
}

/// Numerators over the least common denominator, or `None` on overflow.
fn exact_weights(leaves: &[(Egress, Share)]) -> Option<Vec<u128>> {
    let mut common = 1u128;
    for (_, share) in leaves {
        let (_, den) = share.exact?;
        common = (common / gcd(common, den).max(1)).checked_mul(den)?;
    }
    let mut weights = Vec::with_capacity(leaves.len());
    let mut total = 0u128;
    for (_, share) in leaves {
        let (num, den) = share.exact?;
        let weight = num.checked_mul(common / den.max(1))?;
        total = total.checked_add(weight)?;
        weights.push(weight);
    }
    Some(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aft::{
        AftEntry, NextHopEntry, NextHopGroupEntry, NextHopKey, NextHopKind, PrefixEntry,
    };
    use crate::resolve::UnresolvedReason;
    use pretty_assertions::assert_eq;

    const DEPTH: u32 = 8;

    fn ni(name: &str) -> NetworkInstance {
        NetworkInstance::new(name)
    }

    fn pfx(s: &str) -> IpPrefix {
        s.parse().unwrap()
    }

    /// Builds tables directly, bypassing programming-time validation.
    fn tables(entries: Vec<AftEntry>, down: &[u64]) -> AftTables {
        let mut tables = AftTables::new();
        for entry in entries {
            let viable = match &entry {
                AftEntry::NextHop(nh) => !down.contains(&nh.key.index),
                _ => false,
            };
            tables.upsert(entry, viable);
        }
        tables
    }

    fn outer() -> OuterHeader {
        OuterHeader::new("198.18.0.1".parse().unwrap(), "203.0.113.100".parse().unwrap())
    }

    #[test]
    fn test_weighted_ecmp_ratios() {
        let t = tables(
            vec![
                NextHopEntry::forward("DEFAULT", 1, "port2").into(),
                NextHopEntry::forward("DEFAULT", 2, "port3").into(),
                NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 3).with_member(2, 1).into(),
                PrefixEntry::new("DEFAULT", pfx("198.51.100.0/24"), 1).into(),
            ],
            &[],
        );
        let result = resolve_in(&t, &ni("DEFAULT"), &pfx("198.51.100.0/24"), DEPTH);
        assert!(!result.unresolved);
        let ratios = result.ratios();
        assert_eq!(ratios["port2"], 0.75);
        assert_eq!(ratios["port3"], 0.25);
    }

    #[test]
    fn test_unviable_members_excluded() {
        let t = tables(
            vec![
                NextHopEntry::forward("DEFAULT", 1, "port2").into(),
                NextHopEntry::forward("DEFAULT", 2, "port3").into(),
                NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 3).with_member(2, 1).into(),
                PrefixEntry::new("DEFAULT", pfx("198.51.100.0/24"), 1).into(),
            ],
            &[1],
        );
        let result = resolve_in(&t, &ni("DEFAULT"), &pfx("198.51.100.0/24"), DEPTH);
        assert_eq!(
            result.ratios().into_iter().collect::<Vec<_>>(),
            vec![("port3".to_string(), 1.0)]
        );
        assert!(!result.backup_activated());
    }

    #[test]
    fn test_backup_takes_over_only_when_all_members_down() {
        let t = tables(
            vec![
                NextHopEntry::forward("DEFAULT", 1, "port2").into(),
                NextHopEntry::forward("DEFAULT", 9, "port9").into(),
                NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 1).with_backup(2).into(),
                NextHopGroupEntry::new("DEFAULT", 2).with_member(9, 1).into(),
                PrefixEntry::new("DEFAULT", pfx("198.51.100.0/24"), 1).into(),
            ],
            &[1],
        );
        let result = resolve_in(&t, &ni("DEFAULT"), &pfx("198.51.100.0/24"), DEPTH);
        assert_eq!(result.egress.len(), 1);
        assert_eq!(result.egress[0].next_hop, NextHopKey::new("DEFAULT", 9));
        assert_eq!(result.activated_backups(), vec![&NhgKey::new("DEFAULT", 2)]);
    }

    #[test]
    fn test_cascading_backups() {
        let t = tables(
            vec![
                NextHopEntry::forward("DEFAULT", 1, "port2").into(),
                NextHopEntry::forward("DEFAULT", 2, "port3").into(),
                NextHopEntry::forward("DEFAULT", 3, "port4").into(),
                NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 1).with_backup(2).into(),
                NextHopGroupEntry::new("DEFAULT", 2).with_member(2, 1).with_backup(3).into(),
                NextHopGroupEntry::new("DEFAULT", 3).with_member(3, 1).into(),
                PrefixEntry::new("DEFAULT", pfx("198.51.100.0/24"), 1).into(),
            ],
            &[1, 2],
        );
        let result = resolve_in(&t, &ni("DEFAULT"), &pfx("198.51.100.0/24"), DEPTH);
        assert_eq!(result.egress[0].label(), "port4");
        assert_eq!(result.activated_backups().len(), 2);
    }

    #[test]
    fn test_backup_cycle_resolves_unresolved() {
        let t = tables(
            vec![
                NextHopEntry::forward("DEFAULT", 1, "port2").into(),
                NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 1).with_backup(2).into(),
                NextHopGroupEntry::new("DEFAULT", 2).with_member(1, 1).with_backup(1).into(),
                PrefixEntry::new("DEFAULT", pfx("198.51.100.0/24"), 1).into(),
            ],
            &[1],
        );
        let result = resolve_in(&t, &ni("DEFAULT"), &pfx("198.51.100.0/24"), DEPTH);
        assert!(result.unresolved);
        assert_eq!(
            result.reason(),
            Some(&UnresolvedReason::BackupCycle {
                key: NhgKey::new("DEFAULT", 1)
            })
        );
    }

    #[test]
    fn test_depth_budget_bounds_backup_chain() {
        let mut entries: Vec<AftEntry> = vec![NextHopEntry::forward("DEFAULT", 1, "port2").into()];
        for id in 1..=12 {
            let group = NextHopGroupEntry::new("DEFAULT", id).with_member(1, 1).with_backup(id + 1);
            entries.push(group.into());
        }
        entries.push(PrefixEntry::new("DEFAULT", pfx("198.51.100.0/24"), 1).into());
        let t = tables(entries, &[1]);

        let result = resolve_in(&t, &ni("DEFAULT"), &pfx("198.51.100.0/24"), 3);
        assert!(result.unresolved);
        assert_eq!(result.reason(), Some(&UnresolvedReason::DepthExhausted { max_depth: 3 }));
    }

    #[test]
    fn test_missing_prefix_and_group() {
        let t = tables(vec![PrefixEntry::new("DEFAULT", pfx("10.0.0.0/8"), 42).into()], &[]);
        let missing_group = resolve_in(&t, &ni("DEFAULT"), &pfx("10.0.0.0/8"), DEPTH);
        assert_eq!(
            missing_group.reason(),
            Some(&UnresolvedReason::MissingGroup {
                key: NhgKey::new("DEFAULT", 42)
            })
        );

        let missing_prefix = resolve_in(&t, &ni("DEFAULT"), &pfx("10.1.0.0/16"), DEPTH);
        assert!(matches!(
            missing_prefix.reason(),
            Some(UnresolvedReason::NoPrefixEntry { .. })
        ));
    }

    #[test]
    fn test_decap_encap_keeps_inner_destination() {
        let dst = pfx("203.0.113.1/32");
        let t = tables(
            vec![
                NextHopEntry::decap_encap("VRF-A", 1, outer(), "DEFAULT").into(),
                NextHopGroupEntry::new("VRF-A", 1).with_member(1, 1).into(),
                PrefixEntry::new("VRF-A", dst, 1).into(),
                NextHopEntry::forward("DEFAULT", 5, "port5").into(),
                NextHopGroupEntry::new("DEFAULT", 5).with_member(5, 1).into(),
                PrefixEntry::new("DEFAULT", dst, 5).into(),
            ],
            &[],
        );
        let result = resolve_in(&t, &ni("VRF-A"), &dst, DEPTH);
        assert!(!result.unresolved);
        assert_eq!(result.egress[0].outer_header, Some(outer()));
        assert_eq!(result.egress[0].label(), "port5");
        assert_eq!(
            result.lookups(),
            vec![(&ni("VRF-A"), &dst), (&ni("DEFAULT"), &dst)]
        );
        assert_eq!(
            result.next_hops_of_kind(NextHopKind::DecapEncap),
            vec![&NextHopKey::new("VRF-A", 1)]
        );
    }

    #[test]
    fn test_nested_weights_multiply() {
        let dst = pfx("198.51.100.0/24");
        let t = tables(
            vec![
                NextHopEntry::encap("VRF-A", 1, outer(), "DEFAULT").into(),
                NextHopEntry::forward("VRF-A", 2, "port9").into(),
                NextHopGroupEntry::new("VRF-A", 1).with_member(1, 1).with_member(2, 1).into(),
                PrefixEntry::new("VRF-A", dst, 1).into(),
                NextHopEntry::forward("DEFAULT", 1, "port2").into(),
                NextHopEntry::forward("DEFAULT", 2, "port3").into(),
                NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 3).with_member(2, 1).into(),
                PrefixEntry::new("DEFAULT", dst, 1).into(),
            ],
            &[],
        );
        let result = resolve_in(&t, &ni("VRF-A"), &dst, DEPTH);
        let ratios = result.ratios();
        assert_eq!(ratios["port9"], 0.5);
        assert_eq!(ratios["port2"], 0.375);
        assert_eq!(ratios["port3"], 0.125);
    }

    #[test]
    fn test_huge_weights_across_decap_keep_ratios() {
        let dst = pfx("203.0.113.1/32");
        let t = tables(
            vec![
                NextHopEntry::decap("VRF-A", 1, "DEFAULT").into(),
                NextHopEntry::forward("VRF-A", 5, "port5").into(),
                NextHopGroupEntry::new("VRF-A", 1)
                    .with_member(1, u64::MAX)
                    .with_member(5, 1)
                    .into(),
                PrefixEntry::new("VRF-A", dst, 1).into(),
                NextHopEntry::forward("DEFAULT", 2, "port2").into(),
                NextHopEntry::forward("DEFAULT", 3, "port3").into(),
                NextHopGroupEntry::new("DEFAULT", 1)
                    .with_member(2, u64::MAX)
                    .with_member(3, u64::MAX - 2)
                    .into(),
                PrefixEntry::new("DEFAULT", dst, 1).into(),
            ],
            &[],
        );
        let result = resolve_in(&t, &ni("VRF-A"), &dst, DEPTH);
        assert!(!result.unresolved);
        assert_eq!(result.egress.len(), 3);

        let ratios = result.ratios();
        let sum: f64 = ratios.values().sum();
        assert!((sum - 1.0).abs() < 1e-9, "{ratios:?}");
        assert!((ratios["port2"] - 0.5).abs() < 1e-9, "{ratios:?}");
        assert!((ratios["port3"] - 0.5).abs() < 1e-9, "{ratios:?}");
        assert!(ratios["port5"] < 1e-9, "{ratios:?}");
    }

    #[test]
    fn test_large_weights_stay_exact_when_they_fit() {
        let t = tables(
            vec![
                NextHopEntry::forward("DEFAULT", 1, "port2").into(),
                NextHopEntry::forward("DEFAULT", 2, "port3").into(),
                NextHopGroupEntry::new("DEFAULT", 1)
                    .with_member(1, u64::MAX)
                    .with_member(2, u64::MAX)
                    .into(),
                PrefixEntry::new("DEFAULT", pfx("198.51.100.0/24"), 1).into(),
            ],
            &[],
        );
        let result = resolve_in(&t, &ni("DEFAULT"), &pfx("198.51.100.0/24"), DEPTH);
        assert_eq!(result.egress.iter().map(|e| e.weight).collect::<Vec<_>>(), vec![1, 1]);
    }

    #[test]
    fn test_equal_weights_reduce() {
        let t = tables(
            vec![
                NextHopEntry::forward("DEFAULT", 1, "port2").into(),
                NextHopEntry::forward("DEFAULT", 2, "port3").into(),
                NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 40).with_member(2, 40).into(),
                PrefixEntry::new("DEFAULT", pfx("198.51.100.0/24"), 1).into(),
            ],
            &[],
        );
        let result = resolve_in(&t, &ni("DEFAULT"), &pfx("198.51.100.0/24"), DEPTH);
        assert_eq!(result.egress.iter().map(|e| e.weight).collect::<Vec<_>>(), vec![1, 1]);
    }

    #[test]
    fn test_lookup_loop_detected() {
        let dst = pfx("203.0.113.1/32");
        let t = tables(
            vec![
                NextHopEntry::decap("VRF-A", 1, "DEFAULT").into(),
                NextHopGroupEntry::new("VRF-A", 1).with_member(1, 1).into(),
                PrefixEntry::new("VRF-A", dst, 1).into(),
                NextHopEntry::decap("DEFAULT", 1, "VRF-A").into(),
                NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 1).into(),
                PrefixEntry::new("DEFAULT", dst, 1).into(),
            ],
            &[],
        );
        let result = resolve_in(&t, &ni("VRF-A"), &dst, DEPTH);
        assert!(result.unresolved);
        assert_eq!(
            result.reason(),
            Some(&UnresolvedReason::LookupLoop {
                network_instance: ni("VRF-A")
            })
        );
    }

    #[test]
    fn test_decap_without_inner_route_does_not_fall_to_backup() {
        let dst = pfx("203.0.113.1/32");
        let t = tables(
            vec![
                NextHopEntry::decap("VRF-A", 1, "DEFAULT").into(),
                NextHopEntry::forward("VRF-A", 2, "port9").into(),
                NextHopGroupEntry::new("VRF-A", 1).with_member(1, 1).with_backup(2).into(),
                NextHopGroupEntry::new("VRF-A", 2).with_member(2, 1).into(),
                PrefixEntry::new("VRF-A", dst, 1).into(),
            ],
            &[],
        );
        let result = resolve_in(&t, &ni("VRF-A"), &dst, DEPTH);
        assert!(result.unresolved);
        assert!(!result.backup_activated());
    }
}
