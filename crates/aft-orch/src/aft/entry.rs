//! Tagged union over the three AFT entry kinds and the operations on them.

use super::nexthop::{NextHopEntry, NextHopKey};
use super::nhg::{NextHopGroupEntry, NhgKey};
use super::prefix::{PrefixEntry, PrefixKey};
use aft_types::NetworkInstance;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    NextHop,
    NextHopGroup,
    Prefix,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::NextHop => "next_hop",
            EntryKind::NextHopGroup => "next_hop_group",
            EntryKind::Prefix => "prefix",
        };
        f.write_str(s)
    }
}

/// Key of any entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKey {
    NextHop(NextHopKey),
    NextHopGroup(NhgKey),
    Prefix(PrefixKey),
}

impl EntryKey {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryKey::NextHop(_) => EntryKind::NextHop,
            EntryKey::NextHopGroup(_) => EntryKind::NextHopGroup,
            EntryKey::Prefix(_) => EntryKind::Prefix,
        }
    }

    pub fn network_instance(&self) -> &NetworkInstance {
        match self {
            EntryKey::NextHop(k) => &k.network_instance,
            EntryKey::NextHopGroup(k) => &k.network_instance,
            EntryKey::Prefix(k) => &k.network_instance,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::NextHop(k) => fmt::Display::fmt(k, f),
            EntryKey::NextHopGroup(k) => fmt::Display::fmt(k, f),
            EntryKey::Prefix(k) => fmt::Display::fmt(k, f),
        }
    }
}

/// Any AFT entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AftEntry {
    NextHop(NextHopEntry),
    NextHopGroup(NextHopGroupEntry),
    Prefix(PrefixEntry),
}

impl AftEntry {
    pub fn key(&self) -> EntryKey {
        match self {
            AftEntry::NextHop(e) => EntryKey::NextHop(e.key.clone()),
            AftEntry::NextHopGroup(e) => EntryKey::NextHopGroup(e.key.clone()),
            AftEntry::Prefix(e) => EntryKey::Prefix(e.key.clone()),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            AftEntry::NextHop(_) => EntryKind::NextHop,
            AftEntry::NextHopGroup(_) => EntryKind::NextHopGroup,
            AftEntry::Prefix(_) => EntryKind::Prefix,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            AftEntry::NextHop(e) => e.validate(),
            AftEntry::NextHopGroup(e) => e.validate(),
            AftEntry::Prefix(e) => e.validate(),
        }
    }
}

impl From<NextHopEntry> for AftEntry {
    fn from(e: NextHopEntry) -> Self {
        AftEntry::NextHop(e)
    }
}

impl From<NextHopGroupEntry> for AftEntry {
    fn from(e: NextHopGroupEntry) -> Self {
        AftEntry::NextHopGroup(e)
    }
}

impl From<PrefixEntry> for AftEntry {
    fn from(e: PrefixEntry) -> Self {
        AftEntry::Prefix(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Add,
    /// Overwrite an entry that must already exist.
    Replace,
    Delete,
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpType::Add => "ADD",
            OpType::Replace => "REPLACE",
            OpType::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One operation of a programming batch.
///
/// `id` is chosen by the client and echoed in the result; FIB ACK waits
/// are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AftOperation {
    pub id: u64,
    pub op: OpType,
    pub entry: AftEntry,
}

impl AftOperation {
    pub fn add(id: u64, entry: impl Into<AftEntry>) -> Self {
        Self {
            id,
            op: OpType::Add,
            entry: entry.into(),
        }
    }

    pub fn replace(id: u64, entry: impl Into<AftEntry>) -> Self {
        Self {
            id,
            op: OpType::Replace,
            entry: entry.into(),
        }
    }

    /// Delete; only the key of `entry` is used.
    pub fn delete(id: u64, entry: impl Into<AftEntry>) -> Self {
        Self {
            id,
            op: OpType::Delete,
            entry: entry.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operation_serde() {
        let op = AftOperation::add(
            4,
            PrefixEntry::new("VRF-A", "198.51.100.0/24".parse().unwrap(), 10)
                .with_nhg_network_instance("DEFAULT"),
        );
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "add");
        assert_eq!(json["entry"]["type"], "prefix");
        assert_eq!(json["entry"]["key"]["prefix"], "198.51.100.0/24");
        assert_eq!(json["entry"]["next_hop_group"]["network_instance"], "DEFAULT");

        let back: AftOperation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_key_ordering_groups_by_kind() {
        let mut keys = vec![
            EntryKey::Prefix(PrefixKey::new("DEFAULT", "10.0.0.0/8".parse().unwrap())),
            EntryKey::NextHopGroup(NhgKey::new("DEFAULT", 1)),
            EntryKey::NextHop(NextHopKey::new("DEFAULT", 1)),
        ];
        keys.sort();
        let kinds: Vec<_> = keys.iter().map(EntryKey::kind).collect();
        assert_eq!(
            kinds,
            vec![EntryKind::NextHop, EntryKind::NextHopGroup, EntryKind::Prefix]
        );
    }
}
