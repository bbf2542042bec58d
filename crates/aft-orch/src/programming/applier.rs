//! Programming log: applies batches of Add/Replace/Delete operations.
//!
//! A batch is applied to the RIB under a single write guard, so readers
//! never observe half a batch. Every accepted operation is then queued to a
//! single FIB worker, which programs the forwarding plane in RIB order and
//! publishes acknowledgments through a watch channel.

use super::election::{Election, ElectionId};
use super::fib::{FibChange, FibProgrammer};
use super::types::{AckMode, InstalledEntry, OperationResult, ProgrammingStats};
use crate::aft::{
    AftEntry, AftOperation, AftTables, EntryFilter, EntryKey, OpType, SharedTables,
};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::ProgrammingConfig;
use crate::error::{AftError, Result};
use crate::viability::{Liveness, SharedLiveness};
use aft_common::{OperationStatus, ProgrammingResult, WriteOutcome};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Most FIB jobs programmed between two acknowledgment audit records.
const FIB_DRAIN_LIMIT: usize = 256;

/// Work item for the FIB worker. Flushes carry no operation ID.
struct FibJob {
    operation_id: Option<u64>,
    change: FibChange,
}

/// Operation results, kept until evicted by newer ones.
///
/// Records still waiting on the FIB stage, or held by an ack waiter, are
/// never evicted; the book may run over capacity until they settle.
#[derive(Default)]
struct ResultBook {
    records: BTreeMap<u64, OperationResult>,
    pending: BTreeSet<u64>,
    held: BTreeMap<u64, usize>,
    capacity: usize,
}

impl ResultBook {
    fn record(&mut self, result: OperationResult, pending: bool) {
        let id = result.id;
        self.records.insert(id, result);
        if pending {
            self.pending.insert(id);
        } else {
            self.pending.remove(&id);
        }
        self.evict();
    }

    fn hold(&mut self, id: u64) {
        *self.held.entry(id).or_insert(0) += 1;
    }

    fn release(&mut self, id: u64) {
        if let Some(count) = self.held.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.held.remove(&id);
            }
        }
        self.evict();
    }

    fn evict(&mut self) {
        while self.capacity > 0 && self.records.len() > self.capacity {
            let Some(oldest) = self
                .records
                .keys()
                .find(|id| !self.pending.contains(id) && !self.held.contains_key(id))
                .copied()
            else {
                break;
            };
            self.records.remove(&oldest);
        }
    }

    /// The result for `id` once the FIB stage has settled it.
    fn settled(&self, id: u64) -> Option<OperationResult> {
        if self.pending.contains(&id) {
            return None;
        }
        self.records.get(&id).cloned()
    }
}

/// Keeps results in the book while a caller waits on them.
struct HeldResults {
    book: Arc<Mutex<ResultBook>>,
    ids: Vec<u64>,
}

impl HeldResults {
    fn new(book: Arc<Mutex<ResultBook>>) -> Self {
        Self {
            book,
            ids: Vec::new(),
        }
    }
}

impl Drop for HeldResults {
    fn drop(&mut self) {
        let mut book = self.book.lock();
        for id in self.ids.drain(..) {
            book.release(id);
        }
    }
}

struct LogInner {
    tables: SharedTables,
    liveness: SharedLiveness,
    fib: Arc<dyn FibProgrammer>,
    config: ProgrammingConfig,
    election: Mutex<Election>,
    book: Arc<Mutex<ResultBook>>,
    acks: Arc<watch::Sender<u64>>,
    stats: Arc<Mutex<ProgrammingStats>>,
    fib_queue: mpsc::UnboundedSender<FibJob>,
    fib_worker: Mutex<Option<mpsc::UnboundedReceiver<FibJob>>>,
}

/// Shared handle to the programming log. Clones refer to the same log.
#[derive(Clone)]
pub struct ProgrammingLog {
    inner: Arc<LogInner>,
}

impl ProgrammingLog {
    pub fn new(
        tables: SharedTables,
        liveness: SharedLiveness,
        fib: Arc<dyn FibProgrammer>,
        config: ProgrammingConfig,
    ) -> Self {
        let (fib_queue, fib_rx) = mpsc::unbounded_channel();
        let (acks, _) = watch::channel(0);
        let book = ResultBook {
            capacity: config.result_history,
            ..ResultBook::default()
        };
        Self {
            inner: Arc::new(LogInner {
                tables,
                liveness,
                fib,
                config,
                election: Mutex::new(Election::default()),
                book: Arc::new(Mutex::new(book)),
                acks: Arc::new(acks),
                stats: Arc::new(Mutex::new(ProgrammingStats::default())),
                fib_queue,
                fib_worker: Mutex::new(Some(fib_rx)),
            }),
        }
    }

    pub fn tables(&self) -> &SharedTables {
        &self.inner.tables
    }

    pub fn config(&self) -> &ProgrammingConfig {
        &self.inner.config
    }

    /// Highest election ID seen, if any client has offered one.
    pub fn learn_election_id(&self) -> Option<ElectionId> {
        self.inner.election.lock().current()
    }

    /// Offers `id`; it is adopted only if strictly greater than the
    /// current one. Returns the current ID afterwards.
    pub fn update_election_id(&self, id: ElectionId) -> ElectionId {
        let (before, after) = {
            let mut election = self.inner.election.lock();
            let before = election.current();
            (before, election.offer(id))
        };
        if before != Some(after) {
            info!("ProgrammingLog: election id raised to {}", after);
            let record =
                AuditRecord::new(AuditCategory::Election, "ProgrammingLog", "update_election_id");
            audit_log!(record
                .with_outcome(AuditOutcome::Success)
                .with_object_id(after.to_string())
                .with_details(serde_json::json!({
                    "previous": before.map(|b| b.to_string()),
                })));
        }
        after
    }

    pub fn is_leader(&self, id: Option<ElectionId>) -> bool {
        let election = self.inner.election.lock();
        match (election.current(), id) {
            (None, None) => true,
            (Some(_), Some(id)) => election.is_leader(id),
            _ => false,
        }
    }

    /// Applies a batch.
    ///
    /// Returns one result per operation, in order. Invalid operations fail
    /// individually and the rest of the batch still applies. In
    /// [`AckMode::RibAndFib`] the call waits, up to the configured
    /// acknowledgment timeout, for the forwarding plane to confirm each
    /// accepted operation.
    pub async fn modify(
        &self,
        election_id: Option<ElectionId>,
        operations: Vec<AftOperation>,
        ack_mode: AckMode,
    ) -> Vec<OperationResult> {
        self.ensure_fib_worker();

        if !self.is_leader(election_id) {
            return self.reject_not_leader(election_id, operations);
        }

        let mut held = HeldResults::new(Arc::clone(&self.inner.book));
        let mut results = {
            let mut tables = self.inner.tables.write();
            let liveness = self.inner.liveness.read();
            let mut results = Vec::with_capacity(operations.len());
            for operation in operations {
                let result = apply_rib(&mut tables, &liveness, operation);
                if result.status.is_ok() {
                    let change = match result.op {
                        OpType::Delete => FibChange::Remove(result.key.clone()),
                        OpType::Add | OpType::Replace => FibChange::Install(result.key.clone()),
                    };
                    // Recorded before queueing so the worker always finds it.
                    {
                        let mut book = self.inner.book.lock();
                        if ack_mode == AckMode::RibAndFib {
                            book.hold(result.id);
                            held.ids.push(result.id);
                        }
                        book.record(result.clone(), true);
                    }
                    let job = FibJob {
                        operation_id: Some(result.id),
                        change,
                    };
                    if self.inner.fib_queue.send(job).is_err() {
                        warn!(
                            "ProgrammingLog: FIB worker gone, op {} stays in RIB only",
                            result.id
                        );
                        self.inner.book.lock().record(result.clone(), false);
                    }
                } else {
                    self.inner.book.lock().record(result.clone(), false);
                }
                results.push(result);
            }
            results
        };

        self.account(&results);

        if ack_mode == AckMode::RibAndFib {
            let deadline = Instant::now() + self.ack_timeout();
            for result in results.iter_mut().filter(|r| r.status.is_ok()) {
                match self.wait_settled(result.id, deadline).await {
                    Some(settled) => *result = settled,
                    None => {
                        warn!(
                            "ProgrammingLog: no FIB ack for op {} within {:?}",
                            result.id,
                            self.ack_timeout()
                        );
                        result.status = Err(AftError::timeout(
                            format!("FIB ack for operation {}", result.id),
                            self.ack_timeout(),
                        ));
                    }
                }
            }
        }

        results
    }

    /// Waits until the FIB stage settles operation `id`.
    ///
    /// Returns `NotFound` for an ID never submitted (or already evicted)
    /// and `Timeout` if it does not settle within `timeout`.
    pub async fn await_fib_ack(&self, id: u64, timeout: Duration) -> Result<OperationResult> {
        let mut held = HeldResults::new(Arc::clone(&self.inner.book));
        {
            let mut book = self.inner.book.lock();
            if !book.records.contains_key(&id) {
                return Err(AftError::NotFound(format!("operation {id}")));
            }
            book.hold(id);
            held.ids.push(id);
        }
        self.wait_settled(id, Instant::now() + timeout)
            .await
            .ok_or_else(|| AftError::timeout(format!("FIB ack for operation {id}"), timeout))
    }

    /// Latest known result for an operation, settled or not.
    pub fn result(&self, id: u64) -> Option<OperationResult> {
        self.inner.book.lock().records.get(&id).cloned()
    }

    /// Removes every entry matching `filter`.
    ///
    /// Requires leadership unless `override_election` is set. Flushing an
    /// empty scope succeeds and removes nothing.
    pub fn flush(
        &self,
        election_id: Option<ElectionId>,
        filter: &EntryFilter,
        override_election: bool,
    ) -> Result<usize> {
        if !override_election && !self.is_leader(election_id) {
            let err = self.not_leader(election_id);
            audit_log!(AuditRecord::new(AuditCategory::Flush, "ProgrammingLog", "flush")
                .with_outcome(AuditOutcome::Denied)
                .with_error(err.to_string()));
            return Err(err);
        }
        self.ensure_fib_worker();

        let removed = self.inner.tables.write().flush(filter);
        self.queue_removals(&removed);

        info!("ProgrammingLog: flushed {} entries", removed.len());
        audit_log!(AuditRecord::new(AuditCategory::Flush, "ProgrammingLog", "flush")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(
                filter
                    .network_instance
                    .as_ref()
                    .map_or_else(|| "*".to_string(), |ni| ni.to_string()),
            )
            .with_details(serde_json::json!({
                "removed": removed.len(),
                "override_election": override_election,
            })));
        Ok(removed.len())
    }

    /// Deletes specific entries on behalf of a closing session, bypassing
    /// the leader check. Returns how many existed.
    pub(crate) fn purge(&self, keys: &BTreeSet<EntryKey>, session_id: u64) -> usize {
        self.ensure_fib_worker();
        let removed: Vec<EntryKey> = {
            let mut tables = self.inner.tables.write();
            keys.iter().filter(|k| tables.remove(k)).cloned().collect()
        };
        self.queue_removals(&removed);

        audit_log!(AuditRecord::new(AuditCategory::Flush, "ProgrammingLog", "purge_session")
            .with_outcome(AuditOutcome::Success)
            .with_correlation_id(format!("session-{session_id}"))
            .with_details(serde_json::json!({ "removed": removed.len() })));
        removed.len()
    }

    /// Installed entries matching `filter`, in key order.
    pub fn get(&self, filter: &EntryFilter) -> Vec<InstalledEntry> {
        let entries = self.inner.tables.read().entries(filter);
        entries
            .into_iter()
            .map(|entry| {
                let programming_result = if self.inner.fib.is_installed(&entry.key()) {
                    ProgrammingResult::InstalledInFib
                } else {
                    ProgrammingResult::InstalledInRibOnly
                };
                InstalledEntry {
                    entry,
                    programming_result,
                }
            })
            .collect()
    }

    pub fn stats(&self) -> ProgrammingStats {
        self.inner.stats.lock().clone()
    }

    fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.inner.config.ack_timeout_secs)
    }

    async fn wait_settled(&self, id: u64, deadline: Instant) -> Option<OperationResult> {
        let mut acks = self.inner.acks.subscribe();
        let wait = async {
            loop {
                let settled = self.inner.book.lock().settled(id);
                if settled.is_some() {
                    return settled;
                }
                if acks.changed().await.is_err() {
                    return None;
                }
            }
        };
        tokio::time::timeout_at(deadline, wait).await.ok().flatten()
    }

    fn queue_removals(&self, removed: &[EntryKey]) {
        for key in removed {
            let job = FibJob {
                operation_id: None,
                change: FibChange::Remove(key.clone()),
            };
            if self.inner.fib_queue.send(job).is_err() {
                warn!("ProgrammingLog: FIB worker gone, {} not removed from FIB", key);
            }
        }
    }

    fn not_leader(&self, election_id: Option<ElectionId>) -> AftError {
        AftError::NotLeader {
            session: election_id.map_or(0, |id| id.as_u128()),
            current: self.learn_election_id().map_or(0, |id| id.as_u128()),
        }
    }

    fn reject_not_leader(
        &self,
        election_id: Option<ElectionId>,
        operations: Vec<AftOperation>,
    ) -> Vec<OperationResult> {
        let err = self.not_leader(election_id);
        warn!("ProgrammingLog: rejecting batch of {}: {}", operations.len(), err);

        let results: Vec<OperationResult> = operations
            .into_iter()
            .map(|op| OperationResult::failed(op.id, op.op, op.entry.key(), err.clone()))
            .collect();
        {
            let mut book = self.inner.book.lock();
            for result in &results {
                book.record(result.clone(), false);
            }
        }
        {
            let mut stats = self.inner.stats.lock();
            stats.batches += 1;
            stats.rejected += results.len() as u64;
        }
        audit_log!(AuditRecord::new(AuditCategory::Election, "ProgrammingLog", "modify")
            .with_outcome(AuditOutcome::Denied)
            .with_error(err.to_string())
            .with_details(serde_json::json!({ "operations": results.len() })));
        results
    }

    fn account(&self, results: &[OperationResult]) {
        let mut stats = self.inner.stats.lock();
        stats.batches += 1;
        for result in results {
            stats.operations += 1;
            match &result.status {
                Ok(OperationStatus::Installed) => stats.installed += 1,
                Ok(OperationStatus::Unchanged) => stats.unchanged += 1,
                Ok(OperationStatus::Replaced) => stats.replaced += 1,
                Ok(OperationStatus::Deleted) => stats.deleted += 1,
                Ok(OperationStatus::NotFound) => stats.not_found += 1,
                Err(_) => stats.failed += 1,
            }
        }
        let failed: Vec<String> = results
            .iter()
            .filter_map(|r| r.status.as_ref().err().map(|e| format!("{}: {}", r.id, e)))
            .collect();
        drop(stats);

        let record = AuditRecord::new(AuditCategory::Programming, "ProgrammingLog", "modify")
            .with_object_type("batch")
            .with_details(serde_json::json!({
                "operations": results.len(),
                "failed": failed,
            }));
        if failed.is_empty() {
            audit_log!(record.with_outcome(AuditOutcome::Success));
        } else {
            audit_log!(record.with_error(format!("{} operations failed", failed.len())));
        }
    }

    /// Starts the FIB worker on first use, inside the caller's runtime.
    ///
    /// Outside a runtime, jobs stay queued until a later call can start it.
    fn ensure_fib_worker(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let Some(mut rx) = self.inner.fib_worker.lock().take() else {
            return;
        };
        let fib = Arc::clone(&self.inner.fib);
        let book = Arc::clone(&self.inner.book);
        let acks = Arc::clone(&self.inner.acks);
        let stats = Arc::clone(&self.inner.stats);

        runtime.spawn(async move {
            let mut jobs = Vec::with_capacity(FIB_DRAIN_LIMIT);
            while rx.recv_many(&mut jobs, FIB_DRAIN_LIMIT).await > 0 {
                let mut acked = 0usize;
                let mut failed = Vec::new();
                for job in jobs.drain(..) {
                    let outcome = fib.program(&job.change).await;
                    match &outcome {
                        Ok(()) => {
                            acked += 1;
                            stats.lock().fib_acked += 1;
                        }
                        Err(e) => {
                            warn!("ProgrammingLog: FIB rejected {}: {}", job.change.key(), e);
                            failed.push(format!("{}: {}", job.change.key(), e));
                            stats.lock().fib_failed += 1;
                        }
                    }
                    if let Some(id) = job.operation_id {
                        let mut book = book.lock();
                        if let Some(mut result) = book.records.get(&id).cloned() {
                            match outcome {
                                Ok(()) => {
                                    result.programming_result = ProgrammingResult::InstalledInFib
                                }
                                Err(e) => {
                                    result.programming_result = ProgrammingResult::Failed;
                                    result.status = Err(e);
                                }
                            }
                            book.record(result, false);
                        }
                    }
                    acks.send_modify(|generation| *generation += 1);
                }

                let record =
                    AuditRecord::new(AuditCategory::FibAck, "ProgrammingLog", "program_fib")
                        .with_object_type("fib_batch")
                        .with_details(serde_json::json!({
                            "acked": acked,
                            "failed": failed,
                        }));
                if failed.is_empty() {
                    audit_log!(record.with_outcome(AuditOutcome::Success));
                } else {
                    audit_log!(record.with_error(format!("{} FIB changes rejected", failed.len())));
                }
            }
            debug!("ProgrammingLog: FIB worker stopped");
        });
    }
}

/// Applies one operation to the RIB.
fn apply_rib(
    tables: &mut AftTables,
    liveness: &Liveness,
    operation: AftOperation,
) -> OperationResult {
    let AftOperation { id, op, entry } = operation;
    let key = entry.key();

    let status = match op {
        OpType::Delete => {
            if tables.remove(&key) {
                debug!("ProgrammingLog: deleted {}", key);
                Ok(OperationStatus::Deleted)
            } else {
                debug!("ProgrammingLog: delete of absent {} is a no-op", key);
                Ok(OperationStatus::NotFound)
            }
        }
        OpType::Replace if !tables.contains(&key) => Err(AftError::NotFound(key.to_string())),
        OpType::Add | OpType::Replace => write_entry(tables, liveness, entry),
    };

    match status {
        Ok(status) => OperationResult {
            id,
            op,
            key,
            status: Ok(status),
            programming_result: ProgrammingResult::InstalledInRibOnly,
        },
        Err(e) => {
            warn!("ProgrammingLog: {} {} failed: {}", op, key, e);
            OperationResult::failed(id, op, key, e)
        }
    }
}

fn write_entry(
    tables: &mut AftTables,
    liveness: &Liveness,
    entry: AftEntry,
) -> Result<OperationStatus> {
    let key = entry.key();
    entry.validate().map_err(|reason| AftError::invalid(&key, reason))?;

    if let AftEntry::NextHopGroup(group) = &entry {
        if let Some(cycle) = tables.backup_cycle(group) {
            let chain: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            return Err(AftError::invalid(
                &key,
                format!("cyclic backup chain {}", chain.join(" -> ")),
            ));
        }
    }

    let viable = match &entry {
        AftEntry::NextHop(nh) => liveness.evaluate(&nh.action),
        _ => false,
    };
    let status = match tables.upsert(entry, viable) {
        WriteOutcome::Inserted => OperationStatus::Installed,
        WriteOutcome::Unchanged => OperationStatus::Unchanged,
        WriteOutcome::Replaced => OperationStatus::Replaced,
    };
    debug!("ProgrammingLog: {} {}", key, status);
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aft::{NextHopEntry, NextHopGroupEntry, PrefixEntry};
    use crate::programming::InMemoryFib;
    use pretty_assertions::assert_eq;

    fn new_log(config: ProgrammingConfig, fib: InMemoryFib) -> ProgrammingLog {
        ProgrammingLog::new(AftTables::shared(), Liveness::shared(), Arc::new(fib), config)
    }

    fn statuses(results: &[OperationResult]) -> Vec<Option<OperationStatus>> {
        results.iter().map(|r| r.status.clone().ok()).collect()
    }

    #[tokio::test]
    async fn test_add_is_idempotent_and_last_writer_wins() {
        let log = new_log(ProgrammingConfig::default(), InMemoryFib::new());
        let nh = NextHopEntry::forward("DEFAULT", 1, "port2");

        let first = log
            .modify(None, vec![AftOperation::add(1, nh.clone())], AckMode::RibAndFib)
            .await;
        assert_eq!(first[0].status, Ok(OperationStatus::Installed));
        assert_eq!(first[0].programming_result, ProgrammingResult::InstalledInFib);

        let again = log.modify(None, vec![AftOperation::add(2, nh)], AckMode::RibAndFib).await;
        assert_eq!(again[0].status, Ok(OperationStatus::Unchanged));

        let moved = NextHopEntry::forward("DEFAULT", 1, "port3");
        let replaced = log
            .modify(None, vec![AftOperation::add(3, moved)], AckMode::RibAndFib)
            .await;
        assert_eq!(replaced[0].status, Ok(OperationStatus::Replaced));
        assert_eq!(log.tables().read().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_delete_is_not_found_not_error() {
        let log = new_log(ProgrammingConfig::default(), InMemoryFib::new());
        let prefix = PrefixEntry::new("DEFAULT", "198.51.100.0/24".parse().unwrap(), 1);
        log.modify(None, vec![AftOperation::add(1, prefix.clone())], AckMode::RibAndFib).await;

        let mut seen = Vec::new();
        for pass in 0..3 {
            let delete = AftOperation::delete(10 + pass, prefix.clone());
            let results = log.modify(None, vec![delete], AckMode::RibAndFib).await;
            seen.extend(statuses(&results));
        }
        assert_eq!(
            seen,
            vec![
                Some(OperationStatus::Deleted),
                Some(OperationStatus::NotFound),
                Some(OperationStatus::NotFound)
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_entries_do_not_stop_batch() {
        let log = new_log(ProgrammingConfig::default(), InMemoryFib::new());
        let batch = vec![
            AftOperation::add(1, NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 0)),
            AftOperation::add(2, NextHopEntry::forward("DEFAULT", 1, "port2")),
            AftOperation::replace(3, NextHopEntry::forward("DEFAULT", 5, "port5")),
        ];
        let results = log.modify(None, batch, AckMode::RibAndFib).await;

        assert!(matches!(results[0].status, Err(AftError::InvalidEntry { .. })));
        assert_eq!(results[0].programming_result, ProgrammingResult::Failed);
        assert_eq!(results[1].status, Ok(OperationStatus::Installed));
        assert!(matches!(results[2].status, Err(AftError::NotFound(_))));
        assert_eq!(log.stats().failed, 2);
    }

    #[tokio::test]
    async fn test_cyclic_backup_rejected() {
        let log = new_log(ProgrammingConfig::default(), InMemoryFib::new());
        let batch = vec![
            AftOperation::add(
                1,
                NextHopGroupEntry::new("DEFAULT", 1).with_member(1, 1).with_backup(2),
            ),
            AftOperation::add(
                2,
                NextHopGroupEntry::new("DEFAULT", 2).with_member(2, 1).with_backup(1),
            ),
        ];
        let results = log.modify(None, batch, AckMode::Rib).await;
        assert_eq!(results[0].status, Ok(OperationStatus::Installed));
        match &results[1].status {
            Err(AftError::InvalidEntry { reason, .. }) => assert!(reason.contains("cyclic")),
            other => panic!("expected cycle rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_leader_rejected_without_changes() {
        let log = new_log(ProgrammingConfig::default(), InMemoryFib::new());
        log.update_election_id(ElectionId::from_low(10));

        let op = AftOperation::add(1, NextHopEntry::forward("DEFAULT", 1, "port2"));
        let results = log
            .modify(Some(ElectionId::from_low(9)), vec![op.clone()], AckMode::Rib)
            .await;
        assert!(matches!(results[0].status, Err(AftError::NotLeader { .. })));
        assert!(log.tables().read().is_empty());

        let results = log.modify(Some(ElectionId::from_low(10)), vec![op], AckMode::Rib).await;
        assert_eq!(results[0].status, Ok(OperationStatus::Installed));
    }

    #[tokio::test]
    async fn test_fib_exhaustion_keeps_rib_entry() {
        let config = ProgrammingConfig {
            fib_capacity: 1,
            ..ProgrammingConfig::default()
        };
        let log = new_log(config, InMemoryFib::new().with_capacity(1));
        let batch = vec![
            AftOperation::add(1, NextHopEntry::forward("DEFAULT", 1, "port2")),
            AftOperation::add(2, NextHopEntry::forward("DEFAULT", 2, "port3")),
        ];
        let results = log.modify(None, batch, AckMode::RibAndFib).await;
        assert_eq!(results[0].programming_result, ProgrammingResult::InstalledInFib);
        assert_eq!(results[1].programming_result, ProgrammingResult::Failed);
        assert_eq!(results[1].status, Err(AftError::FibExhausted { capacity: 1 }));

        let installed = log.get(&EntryFilter::all());
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[1].programming_result, ProgrammingResult::InstalledInRibOnly);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rib_only_then_await_fib_ack() {
        let log = new_log(
            ProgrammingConfig::default(),
            InMemoryFib::new().with_latency(Duration::from_millis(200)),
        );
        let add = AftOperation::add(7, NextHopEntry::forward("DEFAULT", 1, "port2"));
        let results = log.modify(None, vec![add], AckMode::Rib).await;
        assert_eq!(results[0].programming_result, ProgrammingResult::InstalledInRibOnly);

        let acked = log.await_fib_ack(7, Duration::from_secs(1)).await.unwrap();
        assert_eq!(acked.programming_result, ProgrammingResult::InstalledInFib);
        assert_eq!(acked.status, Ok(OperationStatus::Installed));

        assert!(matches!(
            log.await_fib_ack(99, Duration::from_secs(1)).await,
            Err(AftError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fib_ack_timeout_is_reported() {
        let config = ProgrammingConfig {
            ack_timeout_secs: 1,
            ..ProgrammingConfig::default()
        };
        let log = new_log(config, InMemoryFib::new().with_latency(Duration::from_secs(5)));
        let add = AftOperation::add(1, NextHopEntry::forward("DEFAULT", 1, "port2"));
        let results = log.modify(None, vec![add], AckMode::RibAndFib).await;
        assert!(matches!(results[0].status, Err(AftError::Timeout { .. })));
        assert_eq!(results[0].programming_result, ProgrammingResult::InstalledInRibOnly);

        // The FIB stage still completes in the background.
        let late = log.await_fib_ack(1, Duration::from_secs(10)).await.unwrap();
        assert_eq!(late.programming_result, ProgrammingResult::InstalledInFib);
    }

    #[tokio::test]
    async fn test_flush_requires_leader_unless_overridden() {
        let log = new_log(ProgrammingConfig::default(), InMemoryFib::new());
        log.update_election_id(ElectionId::from_low(2));
        log.modify(
            Some(ElectionId::from_low(2)),
            vec![AftOperation::add(1, NextHopEntry::forward("DEFAULT", 1, "port2"))],
            AckMode::RibAndFib,
        )
        .await;

        assert!(log.flush(Some(ElectionId::from_low(1)), &EntryFilter::all(), false).is_err());
        assert_eq!(log.flush(Some(ElectionId::from_low(1)), &EntryFilter::all(), true).unwrap(), 1);
        assert_eq!(
            log.flush(Some(ElectionId::from_low(2)), &EntryFilter::all(), false).unwrap(),
            0
        );
    }

    #[test]
    fn test_result_book_evicts_oldest() {
        let mut book = ResultBook {
            capacity: 2,
            ..ResultBook::default()
        };
        for id in 1..=3 {
            let key = EntryKey::NextHop(crate::aft::NextHopKey::new("DEFAULT", id));
            let result =
                OperationResult::failed(id, OpType::Add, key, AftError::NotFound("x".into()));
            book.record(result, id == 3);
        }
        assert!(!book.records.contains_key(&1));
        assert!(book.settled(2).is_some());
        assert!(book.settled(3).is_none());
    }

    #[test]
    fn test_result_book_keeps_held_records() {
        let mut book = ResultBook {
            capacity: 1,
            ..ResultBook::default()
        };
        book.hold(1);
        for id in 1..=3 {
            let key = EntryKey::NextHop(crate::aft::NextHopKey::new("DEFAULT", id));
            let result =
                OperationResult::failed(id, OpType::Add, key, AftError::NotFound("x".into()));
            book.record(result, false);
        }
        assert!(book.settled(1).is_some());
        assert!(!book.records.contains_key(&2));

        book.release(1);
        assert!(!book.records.contains_key(&1));
        assert!(book.settled(3).is_some());
    }

    #[tokio::test]
    async fn test_batch_larger_than_history_is_fully_acked() {
        let config = ProgrammingConfig {
            result_history: crate::config::MIN_RESULT_HISTORY,
            ..ProgrammingConfig::default()
        };
        let log = new_log(config, InMemoryFib::new());
        let batch = (1..=200)
            .map(|i| AftOperation::add(i, NextHopEntry::forward("DEFAULT", i, "port2")))
            .collect();
        let results = log.modify(None, batch, AckMode::RibAndFib).await;

        assert_eq!(results.len(), 200);
        for result in &results {
            assert_eq!(result.status, Ok(OperationStatus::Installed), "op {}", result.id);
            assert_eq!(result.programming_result, ProgrammingResult::InstalledInFib);
        }
        assert!(log.inner.book.lock().records.len() <= crate::config::MIN_RESULT_HISTORY);
    }
}
