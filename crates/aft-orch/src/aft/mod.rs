//! AFT entry model: next-hops, next-hop groups, prefixes and their tables.

mod entry;
mod nexthop;
mod nhg;
mod prefix;
mod tables;

pub use entry::{AftEntry, AftOperation, EntryKey, EntryKind, OpType};
pub use nexthop::{NextHopAction, NextHopEntry, NextHopKey, NextHopKind, OuterHeader};
pub use nhg::{NextHopGroupEntry, NhgKey, NhgMember};
pub use prefix::{PrefixEntry, PrefixKey};
pub use tables::{AftTables, EntryFilter, NextHopRecord, SharedTables};
