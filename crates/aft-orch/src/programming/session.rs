//! Client sessions on the programming log.

use super::applier::ProgrammingLog;
use super::election::ElectionId;
use super::types::{AckMode, InstalledEntry, OperationResult, Persistence};
use crate::aft::{AftOperation, EntryFilter, EntryKey, OpType};
use crate::error::Result;
use aft_common::OperationStatus;
use log::info;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One programming client.
///
/// Tracks the entries it programmed so that a [`Persistence::Delete`]
/// session can remove them on close.
pub struct Session {
    id: u64,
    log: ProgrammingLog,
    election_id: Option<ElectionId>,
    persistence: Persistence,
    ack_mode: AckMode,
    owned: BTreeSet<EntryKey>,
}

impl Session {
    pub fn new(log: ProgrammingLog, persistence: Persistence, ack_mode: AckMode) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        info!("Session {}: opened ({:?}, {:?})", id, persistence, ack_mode);
        Self {
            id,
            log,
            election_id: None,
            persistence,
            ack_mode,
            owned: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn election_id(&self) -> Option<ElectionId> {
        self.election_id
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    /// The server's current election ID.
    pub fn learn_election_id(&self) -> Option<ElectionId> {
        self.log.learn_election_id()
    }

    /// Uses `id` for this session and offers it to the server.
    ///
    /// Returns the server's current ID afterwards; the session is leader
    /// only if the two are equal.
    pub fn update_election_id(&mut self, id: ElectionId) -> ElectionId {
        self.election_id = Some(id);
        self.log.update_election_id(id)
    }

    /// Takes leadership with one above the current election ID.
    pub fn become_leader(&mut self) -> ElectionId {
        let next = self
            .learn_election_id()
            .map_or(ElectionId::from_low(1), |current| current.next());
        self.update_election_id(next)
    }

    pub fn is_leader(&self) -> bool {
        self.log.is_leader(self.election_id)
    }

    pub async fn modify(&mut self, operations: Vec<AftOperation>) -> Vec<OperationResult> {
        let results = self
            .log
            .modify(self.election_id, operations, self.ack_mode)
            .await;
        for result in &results {
            if !result.reached_rib() {
                continue;
            }
            match result.op {
                // An identical entry written by another client stays theirs.
                OpType::Add | OpType::Replace
                    if result.status != Ok(OperationStatus::Unchanged) =>
                {
                    self.owned.insert(result.key.clone());
                }
                OpType::Add | OpType::Replace => {}
                OpType::Delete => {
                    self.owned.remove(&result.key);
                }
            }
        }
        results
    }

    pub async fn await_fib_ack(
        &self,
        operation_id: u64,
        timeout: Duration,
    ) -> Result<OperationResult> {
        self.log.await_fib_ack(operation_id, timeout).await
    }

    pub fn flush(&self, filter: &EntryFilter, override_election: bool) -> Result<usize> {
        self.log.flush(self.election_id, filter, override_election)
    }

    pub fn get(&self, filter: &EntryFilter) -> Vec<InstalledEntry> {
        self.log.get(filter)
    }

    /// Entries this session has programmed and not deleted.
    pub fn owned(&self) -> &BTreeSet<EntryKey> {
        &self.owned
    }

    /// Closes the session. Returns the number of entries removed, which is
    /// always 0 under [`Persistence::Preserve`].
    pub fn close(self) -> usize {
        let removed = match self.persistence {
            Persistence::Preserve => 0,
            Persistence::Delete => self.log.purge(&self.owned, self.id),
        };
        info!("Session {}: closed, {} entries removed", self.id, removed);
        removed
    }
}
