//! Next-hop group entries.

use super::nexthop::NextHopKey;
use aft_types::NetworkInstance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Key of a next-hop group: ID within a network instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NhgKey {
    pub network_instance: NetworkInstance,
    pub id: u64,
}

impl NhgKey {
    pub fn new(network_instance: impl Into<NetworkInstance>, id: u64) -> Self {
        Self {
            network_instance: network_instance.into(),
            id,
        }
    }
}

impl fmt::Display for NhgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/nhg:{}", self.network_instance, self.id)
    }
}

/// One weighted member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NhgMember {
    pub next_hop: NextHopKey,
    pub weight: u64,
}

/// A weighted ECMP group with an optional backup.
///
/// The backup is used only when no member is viable. Member order is
/// preserved as programmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextHopGroupEntry {
    pub key: NhgKey,
    pub members: Vec<NhgMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<NhgKey>,
}

impl NextHopGroupEntry {
    pub fn new(network_instance: impl Into<NetworkInstance>, id: u64) -> Self {
        Self {
            key: NhgKey::new(network_instance, id),
            members: Vec::new(),
            backup: None,
        }
    }

    /// Adds a member next-hop in the group's own network instance.
    pub fn with_member(mut self, index: u64, weight: u64) -> Self {
        let next_hop = NextHopKey::new(self.key.network_instance.clone(), index);
        self.members.push(NhgMember { next_hop, weight });
        self
    }

    /// Adds a member next-hop from any network instance.
    pub fn with_member_key(mut self, next_hop: NextHopKey, weight: u64) -> Self {
        self.members.push(NhgMember { next_hop, weight });
        self
    }

    /// Sets a backup group in the same network instance.
    pub fn with_backup(mut self, id: u64) -> Self {
        self.backup = Some(NhgKey::new(self.key.network_instance.clone(), id));
        self
    }

    pub fn with_backup_key(mut self, backup: NhgKey) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn total_weight(&self) -> u128 {
        self.members.iter().map(|m| u128::from(m.weight)).sum()
    }

    /// Structural checks that do not need the rest of the tables.
    ///
    /// Backup cycles through other groups are checked separately, against
    /// the table contents, when the entry is programmed.
    pub fn validate(&self) -> Result<(), String> {
        if !self.key.network_instance.is_valid() {
            return Err("empty network instance".to_string());
        }
        if self.members.is_empty() {
            return Err("group has no members".to_string());
        }
        let mut seen = BTreeSet::new();
        for member in &self.members {
            if member.weight == 0 {
                return Err(format!("member {} has zero weight", member.next_hop));
            }
            if !seen.insert(&member.next_hop) {
                return Err(format!("member {} listed twice", member.next_hop));
            }
        }
        if self.backup.as_ref() == Some(&self.key) {
            return Err("group is its own backup".to_string());
        }
        Ok(())
    }
}
