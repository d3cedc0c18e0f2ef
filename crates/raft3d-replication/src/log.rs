//! The committed command log and its state machine.
//!
//! On the leader, [`ReplicatedLog::propose`] assigns the next index, stores
//! the entry and applies it. Followers feed pulled pages through
//! [`ReplicatedLog::ingest`] and fall back to
//! [`ReplicatedLog::install_snapshot`] when the leader has compacted past
//! their position. Either way every replica applies the same entries in the
//! same order.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use raft3d_core::{
    ApplyResult, Command, LogEntry, LogStore, NodeId, SnapshotMeta, SnapshotSink, SnapshotStore,
    StateMachine,
};
use serde::Serialize;

use crate::checkpoint::CheckpointManager;
use crate::protocol::{PullResponse, SnapshotResponse};
use crate::pull::ReplicationError;

/// Entries replayed per page during recovery.
const REPLAY_PAGE: usize = 256;

/// A command accepted into the log, and what the state machine made of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub index: u64,
    pub result: ApplyResult,
}

/// Outcome of feeding a page of pulled entries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub appended: usize,
    pub applied: usize,
    pub discarded: usize,
}

/// Log positions reported on the readiness endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogStatus {
    pub first_index: u64,
    pub last_index: u64,
    pub applied_index: u64,
}

pub struct ReplicatedLog<M, L, S>
where
    M: StateMachine,
    L: LogStore,
    S: SnapshotStore,
{
    node_id: NodeId,
    term: u64,
    machine: Arc<M>,
    log_store: Arc<L>,
    snapshot_store: Arc<S>,
    snapshot_threshold: u64,
    // Serializes index assignment, append and apply.
    write_lock: Mutex<()>,
}

impl<M, L, S> ReplicatedLog<M, L, S>
where
    M: StateMachine,
    L: LogStore,
    S: SnapshotStore,
{
    pub fn new(node_id: NodeId, machine: Arc<M>, log_store: Arc<L>, snapshot_store: Arc<S>) -> Self {
        Self {
            node_id,
            term: 1,
            machine,
            log_store,
            snapshot_store,
            snapshot_threshold: 0,
            write_lock: Mutex::new(()),
        }
    }

    /// Take a snapshot and compact the log every `threshold` applied
    /// entries. 0 disables automatic compaction.
    pub fn with_snapshot_threshold(mut self, threshold: u64) -> Self {
        self.snapshot_threshold = threshold;
        self
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn machine(&self) -> &Arc<M> {
        &self.machine
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> Result<LogStatus, ReplicationError> {
        Ok(LogStatus {
            first_index: self.log_store.first_index()?,
            last_index: self.log_store.last_index()?,
            applied_index: self.machine.last_applied().index,
        })
    }

    pub fn last_index(&self) -> Result<u64, ReplicationError> {
        Ok(self.log_store.last_index()?)
    }

    /// Append `command` at the next index and apply it.
    pub fn propose(&self, command: &Command) -> Result<Proposal, ReplicationError> {
        let _guard = self.lock();

        let index = self.log_store.last_index()? + 1;
        let entry = LogEntry::for_command(index, self.term, command)?;
        self.log_store.append(entry.clone())?;

        let result = self.machine.apply(&entry);
        tracing::debug!(index, kind = command.kind(), id = command.record_id(), "Committed command");

        self.maybe_compact();
        Ok(Proposal { index, result })
    }

    /// Bring the state machine up to date with durable storage: restore the
    /// latest snapshot, then replay the log tail.
    pub fn recover(&self) -> Result<u64, ReplicationError> {
        let _guard = self.lock();

        if let Some((meta, data)) = self.snapshot_store.latest()? {
            if meta.last_index > self.machine.last_applied().index {
                self.machine.restore(&mut data.as_slice())?;
            }
        }

        let mut replayed = 0;
        loop {
            let since = self.machine.last_applied().index;
            let page = self.log_store.entries_since(since, REPLAY_PAGE)?;
            if page.is_empty() {
                break;
            }
            for entry in &page {
                self.machine.apply(entry);
                replayed += 1;
            }
        }

        tracing::info!(
            replayed,
            applied_index = self.machine.last_applied().index,
            "Recovered replicated log"
        );
        Ok(replayed)
    }

    /// Append and apply the pulled entries that extend the local log.
    pub fn ingest(&self, entries: &[LogEntry]) -> Result<IngestStats, ReplicationError> {
        let _guard = self.lock();
        let mut stats = IngestStats::default();

        let last_index = self.log_store.last_index()?;
        for entry in CheckpointManager::contiguous_after(last_index, entries) {
            if !self.log_store.append(entry.clone())? {
                continue;
            }
            stats.appended += 1;

            match self.machine.apply(entry) {
                ApplyResult::Applied => stats.applied += 1,
                ApplyResult::Duplicate => {}
                ApplyResult::Discarded(_) | ApplyResult::Malformed(_) => stats.discarded += 1,
            }
        }

        self.maybe_compact();
        Ok(stats)
    }

    /// Replace local state with a leader snapshot and drop the log it covers.
    pub fn install_snapshot(&self, meta: SnapshotMeta, data: &[u8]) -> Result<(), ReplicationError> {
        let _guard = self.lock();

        self.machine.restore(&mut &data[..])?;

        let mut sink = self.snapshot_store.create(meta)?;
        if let Err(e) = sink.write_all(data) {
            sink.cancel();
            return Err(ReplicationError::Io(e));
        }
        sink.close()?;
        self.log_store.compact_through(meta.last_index)?;

        tracing::info!(last_index = meta.last_index, "Installed snapshot from leader");
        Ok(())
    }

    /// Snapshot the state machine now and drop the entries it covers.
    pub fn compact(&self) -> Result<SnapshotMeta, ReplicationError> {
        let _guard = self.lock();
        self.take_snapshot()
    }

    /// Entries are already committed when this runs, so a failed
    /// compaction is logged and retried on the next write.
    fn maybe_compact(&self) {
        if self.snapshot_threshold == 0 {
            return;
        }
        if let Err(e) = self.compact_if_due() {
            tracing::error!(error = %e, "Failed to compact log");
        }
    }

    fn compact_if_due(&self) -> Result<(), ReplicationError> {
        let compacted = self.log_store.first_index()?.saturating_sub(1);
        let applied = self.machine.last_applied().index;
        if applied.saturating_sub(compacted) >= self.snapshot_threshold {
            self.take_snapshot()?;
        }
        Ok(())
    }

    fn take_snapshot(&self) -> Result<SnapshotMeta, ReplicationError> {
        let snapshot = self.machine.snapshot()?;
        let meta = snapshot.meta();

        let mut sink = self.snapshot_store.create(meta)?;
        snapshot.persist(&mut sink)?;
        snapshot.release();
        self.log_store.compact_through(meta.last_index)?;

        tracing::info!(last_index = meta.last_index, "Compacted log into snapshot");
        Ok(meta)
    }

    /// Serve a page of the log to a follower that holds everything up to
    /// `since_index`.
    pub fn pull_page(&self, since_index: u64, limit: usize) -> Result<PullResponse, ReplicationError> {
        let first_index = self.log_store.first_index()?;
        let last_index = self.log_store.last_index()?;

        if since_index.saturating_add(1) < first_index {
            return Ok(PullResponse::snapshot_required(self.node_id, last_index));
        }

        let entries = self.log_store.entries_since(since_index, limit)?;
        let has_more = entries.last().is_some_and(|e| e.index < last_index);
        Ok(PullResponse::new(self.node_id, entries, has_more, last_index))
    }

    pub fn latest_snapshot(&self) -> Result<Option<SnapshotResponse>, ReplicationError> {
        Ok(self
            .snapshot_store
            .latest()?
            .map(|(meta, data)| SnapshotResponse {
                from_node: self.node_id,
                meta,
                data,
            }))
    }
}
