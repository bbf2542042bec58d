//! Viability monitor.
//!
//! Owns the liveness inputs and keeps the `viable` flag of every stored
//! next-hop in step with them. Each flip is broadcast to subscribers.
//! Resolution results are never cached, so a subscriber that sees a
//! change re-resolves to observe it.

use super::types::{Liveness, SharedLiveness, ViabilityCause, ViabilityChange, ViabilityStats};
use crate::aft::{AftTables, NextHopKey, SharedTables};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use aft_types::OperState;
use log::{debug, info};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::broadcast;

const NOTIFICATION_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct ViabilityMonitor {
    tables: SharedTables,
    liveness: SharedLiveness,
    notifier: broadcast::Sender<ViabilityChange>,
    stats: Arc<Mutex<ViabilityStats>>,
}

impl ViabilityMonitor {
    pub fn new(tables: SharedTables, liveness: SharedLiveness) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            tables,
            liveness,
            notifier,
            stats: Arc::new(Mutex::new(ViabilityStats::default())),
        }
    }

    /// Receives every viability flip from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ViabilityChange> {
        self.notifier.subscribe()
    }

    pub fn set_interface_state(&self, name: &str, up: bool) -> Vec<ViabilityChange> {
        self.set_interface_oper_state(name, OperState::from_up(up))
    }

    pub fn set_interface_oper_state(&self, name: &str, state: OperState) -> Vec<ViabilityChange> {
        self.stats.lock().interface_events += 1;

        let mut tables = self.tables.write();
        let mut liveness = self.liveness.write();
        if !liveness.set_interface(name, state) {
            return Vec::new();
        }
        debug!("ViabilityMonitor: interface {} is {}", name, state);

        let affected = tables.next_hops_on_interface(name);
        let cause = ViabilityCause::Interface {
            name: name.to_string(),
            state,
        };
        let changes = recompute(&mut tables, &liveness, &affected, &cause);
        drop(liveness);
        drop(tables);

        self.publish(&changes, name);
        changes
    }

    pub fn set_neighbor_resolved(&self, ip: IpAddr, resolved: bool) -> Vec<ViabilityChange> {
        self.stats.lock().neighbor_events += 1;

        let mut tables = self.tables.write();
        let mut liveness = self.liveness.write();
        if !liveness.set_neighbor(ip, resolved) {
            return Vec::new();
        }
        debug!("ViabilityMonitor: neighbor {} resolved={}", ip, resolved);

        let affected = tables.next_hops_via_neighbor(ip);
        let cause = ViabilityCause::Neighbor { ip, resolved };
        let changes = recompute(&mut tables, &liveness, &affected, &cause);
        drop(liveness);
        drop(tables);

        self.publish(&changes, &ip.to_string());
        changes
    }

    /// Recomputes every next-hop against the current liveness.
    pub fn reevaluate_all(&self) -> Vec<ViabilityChange> {
        let mut tables = self.tables.write();
        let liveness = self.liveness.read();
        let mut changes = Vec::new();
        for (key, record) in tables.next_hop_records_mut() {
            let viable = liveness.evaluate(&record.entry.action);
            if record.viable != viable {
                record.viable = viable;
                changes.push(ViabilityChange {
                    next_hop: key.clone(),
                    viable,
                    cause: ViabilityCause::Reevaluation,
                });
            }
        }
        drop(liveness);
        drop(tables);

        self.publish(&changes, "all");
        changes
    }

    pub fn interface_state(&self, name: &str) -> OperState {
        self.liveness.read().interface_state(name)
    }

    pub fn neighbor_resolved(&self, ip: IpAddr) -> bool {
        self.liveness.read().neighbor_resolved(ip)
    }

    /// Stored viability of a next-hop, `None` if it is not programmed.
    pub fn is_viable(&self, key: &NextHopKey) -> Option<bool> {
        self.tables.read().next_hop(key).map(|r| r.viable)
    }

    pub fn stats(&self) -> ViabilityStats {
        self.stats.lock().clone()
    }

    fn publish(&self, changes: &[ViabilityChange], trigger: &str) {
        if changes.is_empty() {
            return;
        }
        self.stats.lock().transitions += changes.len() as u64;

        for change in changes {
            info!(
                "ViabilityMonitor: {} viable={} ({} receivers)",
                change.next_hop,
                change.viable,
                self.notifier.receiver_count()
            );
            // No subscribers is not an error.
            let _ = self.notifier.send(change.clone());
        }

        let (up, down): (Vec<_>, Vec<_>) = changes.iter().partition(|c| c.viable);
        audit_log!(AuditRecord::new(AuditCategory::Viability, "ViabilityMonitor", "transition")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(trigger)
            .with_object_type("liveness")
            .with_details(serde_json::json!({
                "became_viable": up.iter().map(|c| c.next_hop.to_string()).collect::<Vec<_>>(),
                "became_unviable": down.iter().map(|c| c.next_hop.to_string()).collect::<Vec<_>>(),
            })));
    }
}

fn recompute(
    tables: &mut AftTables,
    liveness: &Liveness,
    affected: &[NextHopKey],
    cause: &ViabilityCause,
) -> Vec<ViabilityChange> {
    let mut changes = Vec::new();
    for key in affected {
        let Some(record) = tables.next_hop(key) else {
            continue;
        };
        let viable = liveness.evaluate(&record.entry.action);
        if tables.set_viable(key, viable) != Some(viable) {
            changes.push(ViabilityChange {
                next_hop: key.clone(),
                viable,
                cause: cause.clone(),
            });
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aft::{AftTables, NextHopEntry};
    use pretty_assertions::assert_eq;

    fn monitor_with(entries: Vec<NextHopEntry>) -> ViabilityMonitor {
        let tables = AftTables::shared();
        {
            let mut t = tables.write();
            for nh in entries {
                t.upsert(nh.into(), false);
            }
        }
        ViabilityMonitor::new(tables, Liveness::shared())
    }

    #[tokio::test]
    async fn test_interface_flip_notifies_dependents() {
        let monitor = monitor_with(vec![
            NextHopEntry::forward("DEFAULT", 1, "port2"),
            NextHopEntry::forward("DEFAULT", 2, "port2"),
            NextHopEntry::forward("DEFAULT", 3, "port3"),
        ]);
        let mut rx = monitor.subscribe();

        let changes = monitor.set_interface_state("port2", true);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.viable));
        assert_eq!(monitor.is_viable(&NextHopKey::new("DEFAULT", 3)), Some(false));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.next_hop, NextHopKey::new("DEFAULT", 1));

        // Repeating the same state is a no-op.
        assert!(monitor.set_interface_state("port2", true).is_empty());

        let down = monitor.set_interface_state("port2", false);
        assert_eq!(down.len(), 2);
        assert!(down.iter().all(|c| !c.viable));
        assert_eq!(monitor.stats().transitions, 4);
    }

    #[test]
    fn test_neighbor_resolution_gates_viability() {
        let ip: IpAddr = "192.0.2.2".parse().unwrap();
        let monitor = monitor_with(vec![
            NextHopEntry::forward("DEFAULT", 1, "port2").with_ip_address(ip)
        ]);
        let key = NextHopKey::new("DEFAULT", 1);

        monitor.set_interface_state("port2", true);
        assert_eq!(monitor.is_viable(&key), Some(false));

        let changes = monitor.set_neighbor_resolved(ip, true);
        assert_eq!(changes.len(), 1);
        assert_eq!(monitor.is_viable(&key), Some(true));
        assert!(monitor.neighbor_resolved(ip));
    }

    #[test]
    fn test_reevaluate_all_fixes_stale_flags() {
        let monitor = monitor_with(vec![NextHopEntry::decap("DEFAULT", 1, "VRF-A")]);
        let changes = monitor.reevaluate_all();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].cause, ViabilityCause::Reevaluation);
        assert!(monitor.reevaluate_all().is_empty());
    }
}
