//! The three AFT tables.
//!
//! References between tables are not enforced on write: a prefix may point
//! at a group that does not exist yet, and a group may be deleted while
//! prefixes still use it. Dangling references surface at resolution time.

use super::entry::{AftEntry, EntryKey, EntryKind};
use super::nexthop::{NextHopEntry, NextHopKey};
use super::nhg::{NextHopGroupEntry, NhgKey};
use super::prefix::{PrefixEntry, PrefixKey};
use aft_common::{SyncMap, WriteOutcome};
use aft_types::NetworkInstance;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

/// A stored next-hop plus its derived viability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHopRecord {
    pub entry: NextHopEntry,
    pub viable: bool,
}

/// Selects entries for Get and Flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFilter {
    #[serde(default)]
    pub network_instance: Option<NetworkInstance>,
    #[serde(default)]
    pub kind: Option<EntryKind>,
}

impl EntryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn network_instance(network_instance: impl Into<NetworkInstance>) -> Self {
        Self {
            network_instance: Some(network_instance.into()),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, key: &EntryKey) -> bool {
        self.network_instance
            .as_ref()
            .map_or(true, |ni| key.network_instance() == ni)
            && self.kind.map_or(true, |k| key.kind() == k)
    }
}

/// Next-hop, next-hop-group and prefix tables.
#[derive(Debug, Default)]
pub struct AftTables {
    next_hops: SyncMap<NextHopKey, NextHopRecord>,
    groups: SyncMap<NhgKey, NextHopGroupEntry>,
    prefixes: SyncMap<PrefixKey, PrefixEntry>,
}

/// Tables shared between the programming log, the viability monitor and
/// the resolution engine. Lock order is tables before liveness.
pub type SharedTables = Arc<RwLock<AftTables>>;

impl AftTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTables {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn next_hop(&self, key: &NextHopKey) -> Option<&NextHopRecord> {
        self.next_hops.get(key)
    }

    pub fn next_hop_group(&self, key: &NhgKey) -> Option<&NextHopGroupEntry> {
        self.groups.get(key)
    }

    pub fn prefix(&self, key: &PrefixKey) -> Option<&PrefixEntry> {
        self.prefixes.get(key)
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        match key {
            EntryKey::NextHop(k) => self.next_hops.contains_key(k),
            EntryKey::NextHopGroup(k) => self.groups.contains_key(k),
            EntryKey::Prefix(k) => self.prefixes.contains_key(k),
        }
    }

    pub fn get(&self, key: &EntryKey) -> Option<AftEntry> {
        match key {
            EntryKey::NextHop(k) => {
                self.next_hops.get(k).map(|r| AftEntry::NextHop(r.entry.clone()))
            }
            EntryKey::NextHopGroup(k) => self.groups.get(k).cloned().map(AftEntry::NextHopGroup),
            EntryKey::Prefix(k) => self.prefixes.get(k).cloned().map(AftEntry::Prefix),
        }
    }

    /// Writes an entry. `viable` only applies to next-hops.
    ///
    /// A next-hop with identical content keeps its stored viability.
    pub fn upsert(&mut self, entry: AftEntry, viable: bool) -> WriteOutcome {
        match entry {
            AftEntry::NextHop(entry) => self.next_hops.upsert_with(
                entry.key.clone(),
                NextHopRecord { entry, viable },
                |old, new| old.entry == new.entry,
            ),
            AftEntry::NextHopGroup(entry) => self.groups.upsert(entry.key.clone(), entry),
            AftEntry::Prefix(entry) => self.prefixes.upsert(entry.key.clone(), entry),
        }
    }

    /// Removes an entry, returning whether it existed.
    pub fn remove(&mut self, key: &EntryKey) -> bool {
        match key {
            EntryKey::NextHop(k) => self.next_hops.remove(k).is_some(),
            EntryKey::NextHopGroup(k) => self.groups.remove(k).is_some(),
            EntryKey::Prefix(k) => self.prefixes.remove(k).is_some(),
        }
    }

    /// Updates the stored viability of a next-hop.
    ///
    /// Returns the previous value, or `None` if the next-hop does not exist.
    pub fn set_viable(&mut self, key: &NextHopKey, viable: bool) -> Option<bool> {
        self.next_hops
            .get_mut(key)
            .map(|record| std::mem::replace(&mut record.viable, viable))
    }

    /// Next-hops egressing `interface`.
    pub fn next_hops_on_interface(&self, interface: &str) -> Vec<NextHopKey> {
        self.next_hops
            .iter()
            .filter(|(_, r)| r.entry.action.interface() == Some(interface))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Next-hops whose viability depends on resolving `ip`.
    pub fn next_hops_via_neighbor(&self, ip: IpAddr) -> Vec<NextHopKey> {
        self.next_hops
            .iter()
            .filter(|(_, r)| r.entry.action.neighbor() == Some(ip))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Returns the backup chain that loops if `candidate` were written.
    ///
    /// The walk uses `candidate` in place of any stored group with the same
    /// key. `None` means the chain terminates.
    pub fn backup_cycle(&self, candidate: &NextHopGroupEntry) -> Option<Vec<NhgKey>> {
        let mut visited = BTreeSet::new();
        let mut chain = vec![candidate.key.clone()];
        visited.insert(candidate.key.clone());

        let mut next = candidate.backup.clone();
        while let Some(current) = next {
            chain.push(current.clone());
            if !visited.insert(current.clone()) {
                return Some(chain);
            }
            next = if current == candidate.key {
                candidate.backup.clone()
            } else {
                self.groups.get(&current).and_then(|g| g.backup.clone())
            };
        }
        None
    }

    /// Removes every entry matching `filter`, returning the removed keys.
    pub fn flush(&mut self, filter: &EntryFilter) -> Vec<EntryKey> {
        let mut removed = Vec::new();
        let wants = |kind| filter.kind.map_or(true, |k| k == kind);
        let in_scope =
            |ni: &NetworkInstance| filter.network_instance.as_ref().map_or(true, |f| f == ni);

        // Reverse dependency order: prefixes, groups, next-hops.
        if wants(EntryKind::Prefix) {
            removed.extend(
                self.prefixes
                    .drain_where(|k, _| in_scope(&k.network_instance))
                    .into_iter()
                    .map(EntryKey::Prefix),
            );
        }
        if wants(EntryKind::NextHopGroup) {
            removed.extend(
                self.groups
                    .drain_where(|k, _| in_scope(&k.network_instance))
                    .into_iter()
                    .map(EntryKey::NextHopGroup),
            );
        }
        if wants(EntryKind::NextHop) {
            removed.extend(
                self.next_hops
                    .drain_where(|k, _| in_scope(&k.network_instance))
                    .into_iter()
                    .map(EntryKey::NextHop),
            );
        }
        removed
    }

    /// Entries matching `filter`, next-hops first, each table in key order.
    pub fn entries(&self, filter: &EntryFilter) -> Vec<AftEntry> {
        let mut out = Vec::new();
        for (k, r) in self.next_hops.iter() {
            if filter.matches(&EntryKey::NextHop(k.clone())) {
                out.push(AftEntry::NextHop(r.entry.clone()));
            }
        }
        for (k, g) in self.groups.iter() {
            if filter.matches(&EntryKey::NextHopGroup(k.clone())) {
                out.push(AftEntry::NextHopGroup(g.clone()));
            }
        }
        for (k, p) in self.prefixes.iter() {
            if filter.matches(&EntryKey::Prefix(k.clone())) {
                out.push(AftEntry::Prefix(p.clone()));
            }
        }
        out
    }

    pub fn count(&self, kind: EntryKind) -> usize {
        match kind {
            EntryKind::NextHop => self.next_hops.len(),
            EntryKind::NextHopGroup => self.groups.len(),
            EntryKind::Prefix => self.prefixes.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.next_hops.len() + self.groups.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutable access for the viability monitor.
    pub(crate) fn next_hop_records_mut(
        &mut self,
    ) -> impl Iterator<Item = (&NextHopKey, &mut NextHopRecord)> {
        self.next_hops.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefix(s: &str) -> aft_types::IpPrefix {
        s.parse().unwrap()
    }

    #[test]
    fn test_identical_next_hop_keeps_viability() {
        let mut tables = AftTables::new();
        let nh = NextHopEntry::forward("DEFAULT", 1, "port2");
        assert_eq!(tables.upsert(nh.clone().into(), true), WriteOutcome::Inserted);
        assert_eq!(tables.upsert(nh.clone().into(), false), WriteOutcome::Unchanged);
        assert!(tables.next_hop(&nh.key).unwrap().viable);

        let moved = NextHopEntry::forward("DEFAULT", 1, "port3");
        assert_eq!(tables.upsert(moved.into(), false), WriteOutcome::Replaced);
        assert!(!tables.next_hop(&nh.key).unwrap().viable);
    }

    #[test]
    fn test_backup_cycle_detection() {
        let mut tables = AftTables::new();
        let group = NextHopGroupEntry::new("DEFAULT", 2).with_member(1, 1).with_backup(3);
        tables.upsert(group.into(), false);
        tables.upsert(NextHopGroupEntry::new("DEFAULT", 3).with_member(1, 1).into(), false);

        let ok = NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 1).with_backup(2);
        assert_eq!(tables.backup_cycle(&ok), None);

        // 3 -> 1 would close 1 -> 2 -> 3 -> 1 once 1 is installed.
        tables.upsert(ok.into(), false);
        let closing = NextHopGroupEntry::new("DEFAULT", 3).with_member(1, 1).with_backup(1);
        let cycle = tables.backup_cycle(&closing).unwrap();
        assert_eq!(cycle.first(), Some(&NhgKey::new("DEFAULT", 3)));
        assert_eq!(cycle.last(), Some(&NhgKey::new("DEFAULT", 3)));
    }

    #[test]
    fn test_flush_scoped_to_instance() {
        let mut tables = AftTables::new();
        tables.upsert(NextHopEntry::forward("DEFAULT", 1, "port2").into(), true);
        tables.upsert(NextHopEntry::decap("VRF-A", 1, "DEFAULT").into(), true);
        tables.upsert(PrefixEntry::new("VRF-A", prefix("198.51.100.0/24"), 1).into(), false);

        let removed = tables.flush(&EntryFilter::network_instance("VRF-A"));
        assert_eq!(removed.len(), 2);
        assert_eq!(tables.len(), 1);
        assert!(tables.flush(&EntryFilter::network_instance("VRF-A")).is_empty());
    }

    #[test]
    fn test_entries_filtered_and_ordered() {
        let mut tables = AftTables::new();
        tables.upsert(PrefixEntry::new("DEFAULT", prefix("10.0.0.0/8"), 1).into(), false);
        tables.upsert(NextHopEntry::forward("DEFAULT", 2, "port3").into(), true);
        tables.upsert(NextHopEntry::forward("DEFAULT", 1, "port2").into(), true);

        let all = tables.entries(&EntryFilter::all());
        let keys: Vec<String> = all.iter().map(|e| e.key().to_string()).collect();
        assert_eq!(keys, vec!["DEFAULT/nh:1", "DEFAULT/nh:2", "DEFAULT/10.0.0.0/8"]);

        let only_prefixes = tables.entries(&EntryFilter::all().with_kind(EntryKind::Prefix));
        assert_eq!(only_prefixes.len(), 1);
    }

    #[test]
    fn test_dependency_lookups() {
        let ip: IpAddr = "192.0.2.2".parse().unwrap();
        let mut tables = AftTables::new();
        let nh = NextHopEntry::forward("DEFAULT", 1, "port2").with_ip_address(ip);
        tables.upsert(nh.into(), true);
        tables.upsert(NextHopEntry::forward("DEFAULT", 2, "port2").into(), true);

        assert_eq!(tables.next_hops_on_interface("port2").len(), 2);
        assert_eq!(tables.next_hops_via_neighbor(ip), vec![NextHopKey::new("DEFAULT", 1)]);
        assert_eq!(tables.set_viable(&NextHopKey::new("DEFAULT", 9), false), None);
        assert_eq!(tables.set_viable(&NextHopKey::new("DEFAULT", 1), false), Some(true));
    }
}
