//! The replicated application state machine.
//!
//! The consensus engine hands every replica the same committed entries in
//! the same order; [`FleetStateMachine::apply`] turns each into the same state
//! change everywhere. Commands that fail to decode or no longer validate
//! against the state at their log position are discarded, identically on
//! every replica, instead of failing the replica.

use std::io::{Read, Write};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::command::LogEntry;
use crate::error::{RestoreError, SnapshotError, ValidationError};
use crate::model::{Filament, PrintJob, Printer};
use crate::state::FleetState;
use crate::storage::{SnapshotMeta, SnapshotSink};

/// Version of the snapshot document layout.
pub const SNAPSHOT_FORMAT: u32 = 1;

/// Boundary between the consensus engine and the application.
pub trait StateMachine: Send + Sync {
    /// Apply one committed entry. Called exactly once per entry, in
    /// increasing index order. Never fails: rejected entries are discarded.
    fn apply(&self, entry: &LogEntry) -> ApplyResult;

    /// Capture the full state at the current log position.
    fn snapshot(&self) -> Result<FsmSnapshot, SnapshotError>;

    /// Replace the full state from a snapshot. On error the previous state
    /// is kept.
    fn restore(&self, reader: &mut dyn Read) -> Result<(), RestoreError>;

    fn last_applied(&self) -> AppliedIndex;
}

/// Log position of the last entry consumed by the state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedIndex {
    pub index: u64,
    pub term: u64,
}

/// Outcome of applying one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// The command changed the state.
    Applied,
    /// The command no longer validates against the state at its position.
    Discarded(ValidationError),
    /// The entry does not decode to a command.
    Malformed(String),
    /// The entry index was already applied.
    Duplicate,
}

impl ApplyResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyResult::Applied)
    }
}

/// Counters for entries seen by the state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyStats {
    pub applied: u64,
    pub discarded: u64,
    pub malformed: u64,
    pub duplicate: u64,
}

/// A serialized point-in-time copy of the state machine.
#[derive(Debug, Clone)]
pub struct FsmSnapshot {
    meta: SnapshotMeta,
    data: Vec<u8>,
}

impl FsmSnapshot {
    pub fn meta(&self) -> SnapshotMeta {
        self.meta
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Write the snapshot to `sink` and close it; cancel the sink on a
    /// failed write.
    pub fn persist<K: SnapshotSink + ?Sized>(&self, sink: &mut K) -> Result<(), SnapshotError> {
        if let Err(e) = sink.write_all(&self.data).and_then(|_| sink.flush()) {
            sink.cancel();
            return Err(e.into());
        }
        sink.close()?;
        Ok(())
    }

    /// Drop the snapshot once the engine is done with it.
    pub fn release(self) {}
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format: u32,
    last_applied: AppliedIndex,
    #[serde(flatten)]
    state: &'a FleetState,
}

#[derive(Deserialize)]
struct SnapshotDocument {
    #[serde(default = "current_format")]
    format: u32,
    #[serde(default)]
    last_applied: AppliedIndex,
    #[serde(flatten)]
    state: FleetState,
}

fn current_format() -> u32 {
    SNAPSHOT_FORMAT
}

#[derive(Default)]
struct Inner {
    state: FleetState,
    last_applied: AppliedIndex,
    stats: ApplyStats,
}

/// Owns the printer, filament and print job collections.
///
/// Apply, snapshot and restore all go through one lock, so readers never see
/// a half-applied entry and snapshots never capture one.
#[derive(Default)]
pub struct FleetStateMachine {
    inner: RwLock<Inner>,
}

impl FleetStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against a consistent view of the state.
    pub fn view<R>(&self, f: impl FnOnce(&FleetState) -> R) -> R {
        f(&self.read().state)
    }

    /// A copy of the full state.
    pub fn state(&self) -> FleetState {
        self.view(Clone::clone)
    }

    pub fn printers(&self) -> Vec<Printer> {
        self.view(|s| s.printers().cloned().collect())
    }

    pub fn filaments(&self) -> Vec<Filament> {
        self.view(|s| s.filaments().cloned().collect())
    }

    pub fn print_jobs(&self) -> Vec<PrintJob> {
        self.view(|s| s.print_jobs().cloned().collect())
    }

    pub fn printer(&self, id: &str) -> Option<Printer> {
        self.view(|s| s.printer(id).cloned())
    }

    pub fn filament(&self, id: &str) -> Option<Filament> {
        self.view(|s| s.filament(id).cloned())
    }

    pub fn print_job(&self, id: &str) -> Option<PrintJob> {
        self.view(|s| s.print_job(id).cloned())
    }

    pub fn stats(&self) -> ApplyStats {
        self.read().stats
    }
}

impl StateMachine for FleetStateMachine {
    fn apply(&self, entry: &LogEntry) -> ApplyResult {
        let mut inner = self.write();

        if entry.index <= inner.last_applied.index {
            inner.stats.duplicate += 1;
            tracing::debug!(index = entry.index, "Skipping already applied entry");
            return ApplyResult::Duplicate;
        }
        inner.last_applied = AppliedIndex {
            index: entry.index,
            term: entry.term,
        };

        let command = match entry.command() {
            Ok(command) => command,
            Err(e) => {
                inner.stats.malformed += 1;
                tracing::warn!(index = entry.index, error = %e, "Skipping malformed log entry");
                return ApplyResult::Malformed(e.to_string());
            }
        };

        match inner.state.apply(&command) {
            Ok(()) => {
                inner.stats.applied += 1;
                tracing::debug!(
                    index = entry.index,
                    kind = command.kind(),
                    id = command.record_id(),
                    "Applied command"
                );
                ApplyResult::Applied
            }
            Err(e) => {
                inner.stats.discarded += 1;
                tracing::warn!(
                    index = entry.index,
                    kind = command.kind(),
                    id = command.record_id(),
                    reason = %e,
                    "Discarding committed command"
                );
                ApplyResult::Discarded(e)
            }
        }
    }

    fn snapshot(&self) -> Result<FsmSnapshot, SnapshotError> {
        let inner = self.read();
        let data = serde_json::to_vec(&SnapshotRef {
            format: SNAPSHOT_FORMAT,
            last_applied: inner.last_applied,
            state: &inner.state,
        })?;

        Ok(FsmSnapshot {
            meta: SnapshotMeta::new(inner.last_applied.index, inner.last_applied.term),
            data,
        })
    }

    fn restore(&self, reader: &mut dyn Read) -> Result<(), RestoreError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let doc: SnapshotDocument = serde_json::from_slice(&data)?;
        if doc.format != SNAPSHOT_FORMAT {
            return Err(RestoreError::UnsupportedFormat(doc.format));
        }
        doc.state.check_invariants()?;

        let mut inner = self.write();
        inner.state = doc.state;
        inner.last_applied = doc.last_applied;
        // Counters describe entries applied since the restored position.
        inner.stats = ApplyStats::default();
        tracing::info!(
            last_index = doc.last_applied.index,
            "Restored state machine from snapshot"
        );
        Ok(())
    }

    fn last_applied(&self) -> AppliedIndex {
        self.read().last_applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::model::JobStatus;
    use crate::storage::memory::InMemorySnapshotStore;
    use crate::storage::SnapshotStore;
    use crate::validation::Validator;
    use std::sync::Arc;

    /// Feeds commands to a machine with consecutive indexes.
    struct Feeder {
        machine: FleetStateMachine,
        next_index: u64,
    }

    impl Feeder {
        fn new() -> Self {
            Self {
                machine: FleetStateMachine::new(),
                next_index: 1,
            }
        }

        fn submit(&mut self, command: Command) -> ApplyResult {
            let entry = LogEntry::for_command(self.next_index, 1, &command).unwrap();
            self.next_index += 1;
            self.machine.apply(&entry)
        }

        fn transition(&mut self, job_id: &str, status: &str) -> ApplyResult {
            let job = self
                .machine
                .view(|s| Validator::validate_transition(s, job_id, status))
                .unwrap();
            self.submit(Command::UpsertPrintJob(job))
        }
    }

    /// Scenarios 1-3: filament, printer, job created, started, completed.
    fn completed_job() -> Feeder {
        let mut feeder = Feeder::new();
        feeder.submit(Command::AddFilament(Filament::new("f1", "PLA", "red", 1000, 1000)));
        feeder.submit(Command::AddPrinter(Printer::new("p1", "Prusa", "MK4")));
        let result = feeder.submit(Command::UpsertPrintJob(PrintJob::new(
            "j1",
            "p1",
            "f1",
            "/gcode/benchy.gcode",
            400,
        )));
        assert_eq!(result, ApplyResult::Applied);
        assert_eq!(feeder.machine.filament("f1").unwrap().remaining_weight_grams, 1000);

        assert_eq!(feeder.transition("j1", "running"), ApplyResult::Applied);
        assert_eq!(feeder.transition("j1", "done"), ApplyResult::Applied);
        feeder
    }

    #[test]
    fn test_job_lifecycle_consumes_filament() {
        let feeder = completed_job();

        assert_eq!(feeder.machine.print_job("j1").unwrap().status, JobStatus::Done);
        assert_eq!(feeder.machine.filament("f1").unwrap().remaining_weight_grams, 600);
        assert_eq!(feeder.machine.last_applied().index, 5);
        assert_eq!(feeder.machine.stats().applied, 5);
    }

    #[test]
    fn test_job_on_missing_filament_is_discarded() {
        let mut feeder = completed_job();
        let before = feeder.machine.state();

        let result = feeder.submit(Command::UpsertPrintJob(PrintJob::new(
            "j2", "p1", "f99", "/x.gcode", 10,
        )));

        assert_eq!(
            result,
            ApplyResult::Discarded(ValidationError::FilamentNotFound("f99".to_string()))
        );
        assert_eq!(feeder.machine.state(), before);
        assert_eq!(feeder.machine.last_applied().index, 6);
        assert_eq!(feeder.machine.stats().discarded, 1);
    }

    #[test]
    fn test_done_job_cannot_be_canceled() {
        let mut feeder = completed_job();
        let done = feeder.machine.print_job("j1").unwrap();

        // Rejected at submission...
        let err = feeder
            .machine
            .view(|s| Validator::validate_transition(s, "j1", "canceled"))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::IllegalTransition {
                from: JobStatus::Done,
                to: JobStatus::Canceled,
            }
        );

        // ...and discarded if it reaches the log anyway.
        let result = feeder.submit(Command::UpsertPrintJob(done.with_status(JobStatus::Canceled)));
        assert!(matches!(result, ApplyResult::Discarded(ValidationError::IllegalTransition { .. })));
        assert_eq!(feeder.machine.print_job("j1").unwrap().status, JobStatus::Done);
        assert_eq!(feeder.machine.filament("f1").unwrap().remaining_weight_grams, 600);
    }

    #[test]
    fn test_snapshot_restores_into_fresh_machine() {
        let feeder = completed_job();
        let snapshot = feeder.machine.snapshot().unwrap();
        assert_eq!(snapshot.meta().last_index, 5);

        let fresh = FleetStateMachine::new();
        fresh.restore(&mut snapshot.data()).unwrap();

        let jobs = fresh.print_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "j1");
        assert_eq!(jobs[0].status, JobStatus::Done);
        assert_eq!(fresh.filament("f1").unwrap().remaining_weight_grams, 600);
        assert_eq!(fresh.state(), feeder.machine.state());
        assert_eq!(fresh.last_applied(), feeder.machine.last_applied());

        // Entries already covered by the snapshot are not applied twice.
        let replay = LogEntry::for_command(
            5,
            1,
            &Command::AddPrinter(Printer::new("p2", "Voron", "2.4")),
        )
        .unwrap();
        assert_eq!(fresh.apply(&replay), ApplyResult::Duplicate);
    }

    #[test]
    fn test_snapshot_bytes_are_reproducible() {
        let a = completed_job();
        let b = completed_job();

        assert_eq!(a.machine.snapshot().unwrap().data(), b.machine.snapshot().unwrap().data());
    }

    #[test]
    fn test_apply_is_deterministic_across_replicas() {
        let commands = vec![
            Command::AddPrinter(Printer::new("p2", "Bambu", "P1S")),
            Command::AddPrinter(Printer::new("p1", "Prusa", "MK4")),
            Command::AddFilament(Filament::new("f1", "PETG", "black", 500, 500)),
            Command::UpsertPrintJob(PrintJob::new("a", "p1", "f1", "a.gcode", 300)),
            Command::UpsertPrintJob(PrintJob::new("b", "p2", "f1", "b.gcode", 300)),
            Command::UpsertPrintJob(PrintJob::new("a", "p1", "f1", "a.gcode", 300).with_status(JobStatus::Running)),
            Command::UpsertPrintJob(PrintJob::new("b", "p2", "f1", "b.gcode", 300).with_status(JobStatus::Running)),
            Command::UpsertPrintJob(PrintJob::new("b", "p2", "f1", "b.gcode", 300).with_status(JobStatus::Done)),
            // Loses the race for the spool.
            Command::UpsertPrintJob(PrintJob::new("a", "p1", "f1", "a.gcode", 300).with_status(JobStatus::Done)),
            Command::AddFilament(Filament::new("f1", "PETG", "black", 500, 450)),
        ];

        let replicas: Vec<FleetStateMachine> = (0..2).map(|_| FleetStateMachine::new()).collect();
        for replica in &replicas {
            for (i, command) in commands.iter().enumerate() {
                replica.apply(&LogEntry::for_command(i as u64 + 1, 1, command).unwrap());
            }
            let job_a = replica.print_job("a").unwrap();
            assert_eq!(job_a.status, JobStatus::Running);
        }

        assert_eq!(replicas[0].state(), replicas[1].state());
        assert_eq!(
            replicas[0].snapshot().unwrap().data(),
            replicas[1].snapshot().unwrap().data()
        );
        assert_eq!(replicas[0].filament("f1").unwrap().remaining_weight_grams, 450);
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        let mut feeder = completed_job();
        let before = feeder.machine.state();

        let entry = LogEntry::new(feeder.next_index, 1, b"{\"type\":\"add_printer\"".to_vec());
        feeder.next_index += 1;
        let result = feeder.machine.apply(&entry);

        assert!(matches!(result, ApplyResult::Malformed(_)));
        assert_eq!(feeder.machine.state(), before);
        assert_eq!(feeder.machine.last_applied().index, 6);
        assert_eq!(feeder.machine.stats().malformed, 1);

        // The next entry still applies.
        let result = feeder.submit(Command::AddPrinter(Printer::new("p2", "Voron", "2.4")));
        assert!(result.is_applied());
    }

    #[test]
    fn test_filament_invariant_holds_under_random_commands() {
        let mut feeder = Feeder::new();
        feeder.submit(Command::AddPrinter(Printer::new("p1", "Prusa", "MK4")));
        feeder.submit(Command::AddFilament(Filament::new("f1", "PLA", "red", 1000, 1000)));

        let statuses = JobStatus::ALL;
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for i in 0..500u64 {
            // xorshift
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let id = format!("j{}", seed % 8);
            let weight = (seed % 450) as u32;
            let status = statuses[(seed % 4) as usize];
            let mut job = PrintJob::new(id, "p1", "f1", "x.gcode", weight).with_status(status);
            if let Some(existing) = feeder.machine.print_job(&job.id) {
                job = existing.with_status(status);
            }
            if i % 97 == 0 {
                job.status = JobStatus::Queued;
            }
            feeder.submit(Command::UpsertPrintJob(job));

            let f1 = feeder.machine.filament("f1").unwrap();
            assert!(f1.remaining_weight_grams <= f1.total_weight_grams);
        }
    }

    #[test]
    fn test_restore_rejects_malformed_payload() {
        let feeder = completed_job();
        let before = feeder.machine.state();

        let err = feeder.machine.restore(&mut &b"{\"printers\": [1, 2"[..]).unwrap_err();
        assert!(matches!(err, RestoreError::Malformed(_)));

        let err = feeder
            .machine
            .restore(&mut &br#"{"format": 9, "printers": {}}"#[..])
            .unwrap_err();
        assert!(matches!(err, RestoreError::UnsupportedFormat(9)));

        let bad_filament = br#"{"filaments": {"f1": {"id": "f1", "type": "PLA", "color": "red", "total_weight_grams": 10, "remaining_weight_grams": 11}}}"#;
        let err = feeder.machine.restore(&mut &bad_filament[..]).unwrap_err();
        assert!(matches!(err, RestoreError::Invariant(_)));

        assert_eq!(feeder.machine.state(), before);
        assert_eq!(feeder.machine.last_applied().index, 5);
    }

    #[test]
    fn test_restore_accepts_bare_collections() {
        let doc = br#"{
            "printers": {"p1": {"id": "p1", "company": "Creality", "model": "Ender 3"}},
            "filaments": {"f1": {"id": "f1", "type": "PLA", "color": "white", "total_weight_grams": 1000, "remaining_weight_grams": 800}},
            "printjobs": {}
        }"#;

        let machine = FleetStateMachine::new();
        machine.restore(&mut &doc[..]).unwrap();

        assert_eq!(machine.printer("p1").unwrap().model, "Ender 3");
        assert_eq!(machine.filament("f1").unwrap().remaining_weight_grams, 800);
        assert_eq!(machine.last_applied(), AppliedIndex::default());
    }

    #[test]
    fn test_restore_resets_stats() {
        let mut feeder = completed_job();
        feeder.submit(Command::UpsertPrintJob(PrintJob::new("j2", "p1", "f9", "a", 1)));
        assert_eq!(feeder.machine.stats().applied, 5);
        assert_eq!(feeder.machine.stats().discarded, 1);

        let snapshot = feeder.machine.snapshot().unwrap();
        feeder.machine.restore(&mut snapshot.data()).unwrap();

        assert_eq!(feeder.machine.stats(), ApplyStats::default());
        assert_eq!(feeder.machine.last_applied().index, 6);
    }

    #[test]
    fn test_persist_to_sink() {
        let feeder = completed_job();
        let store = InMemorySnapshotStore::new();

        let snapshot = feeder.machine.snapshot().unwrap();
        let mut sink = store.create(snapshot.meta()).unwrap();
        snapshot.persist(&mut sink).unwrap();
        snapshot.release();

        let (meta, data) = store.latest().unwrap().unwrap();
        assert_eq!(meta.last_index, 5);

        let fresh = FleetStateMachine::new();
        fresh.restore(&mut data.as_slice()).unwrap();
        assert_eq!(fresh.state(), feeder.machine.state());
    }

    #[test]
    fn test_readers_never_see_torn_state() {
        let machine = Arc::new(FleetStateMachine::new());
        machine.apply(&LogEntry::for_command(1, 1, &Command::AddPrinter(Printer::new("p1", "Prusa", "MK4"))).unwrap());
        machine.apply(
            &LogEntry::for_command(2, 1, &Command::AddFilament(Filament::new("f1", "PLA", "red", 100_000, 100_000)))
                .unwrap(),
        );

        let writer = {
            let machine = machine.clone();
            std::thread::spawn(move || {
                let mut index = 3;
                for n in 0..200 {
                    let job = PrintJob::new(format!("j{n}"), "p1", "f1", "x.gcode", 10);
                    for status in [JobStatus::Queued, JobStatus::Running, JobStatus::Done] {
                        let entry = LogEntry::for_command(
                            index,
                            1,
                            &Command::UpsertPrintJob(job.with_status(status)),
                        )
                        .unwrap();
                        assert!(machine.apply(&entry).is_applied());
                        index += 1;
                    }
                }
            })
        };

        for _ in 0..200 {
            machine.view(|state| {
                let done = state
                    .print_jobs()
                    .filter(|j| j.status == JobStatus::Done)
                    .count() as u32;
                let remaining = state.filament("f1").unwrap().remaining_weight_grams;
                assert_eq!(remaining, 100_000 - done * 10);
            });
        }

        writer.join().unwrap();
        assert_eq!(machine.filament("f1").unwrap().remaining_weight_grams, 98_000);
    }
}
