//! Prefix entries.

use super::nhg::NhgKey;
use aft_types::{IpPrefix, NetworkInstance};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exact-match key of a prefix entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrefixKey {
    pub network_instance: NetworkInstance,
    pub prefix: IpPrefix,
}

impl PrefixKey {
    pub fn new(network_instance: impl Into<NetworkInstance>, prefix: IpPrefix) -> Self {
        Self {
            network_instance: network_instance.into(),
            prefix,
        }
    }
}

impl fmt::Display for PrefixKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network_instance, self.prefix)
    }
}

/// A prefix pointing at a next-hop group.
///
/// The group may live in another network instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixEntry {
    pub key: PrefixKey,
    pub next_hop_group: NhgKey,
}

impl PrefixEntry {
    /// A prefix whose group lives in the same network instance.
    pub fn new(
        network_instance: impl Into<NetworkInstance>,
        prefix: IpPrefix,
        nhg_id: u64,
    ) -> Self {
        let network_instance = network_instance.into();
        Self {
            next_hop_group: NhgKey::new(network_instance.clone(), nhg_id),
            key: PrefixKey::new(network_instance, prefix),
        }
    }

    /// Points the prefix at a group in another network instance.
    pub fn with_nhg_network_instance(
        mut self,
        network_instance: impl Into<NetworkInstance>,
    ) -> Self {
        self.next_hop_group.network_instance = network_instance.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.key.network_instance.is_valid() {
            return Err("empty network instance".to_string());
        }
        if !self.next_hop_group.network_instance.is_valid() {
            return Err("empty next-hop-group network instance".to_string());
        }
        Ok(())
    }
}
