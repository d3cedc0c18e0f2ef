//! raft3d Core - Domain model, command codec, validation and the replicated
//! state machine.
//!
//! This crate has no dependencies on other raft3d crates and performs no I/O
//! of its own; storage and transport plug in through the traits in
//! [`storage`].

pub mod command;
pub mod error;
pub mod model;
pub mod node;
pub mod state;
pub mod state_machine;
pub mod storage;
pub mod validation;

// Re-exports for convenience
pub use command::{Command, LogEntry};
pub use error::{DecodeError, RestoreError, SnapshotError, StorageError, ValidationError};
pub use model::{valid_transition, Filament, JobStatus, PrintJob, Printer};
pub use node::{LeaderConfig, NodeId, Role};
pub use state::FleetState;
pub use state_machine::{
    AppliedIndex, ApplyResult, ApplyStats, FleetStateMachine, FsmSnapshot, StateMachine,
    SNAPSHOT_FORMAT,
};
pub use storage::{LogStore, SnapshotMeta, SnapshotSink, SnapshotStore};
pub use validation::{JobChange, Validator};

#[cfg(any(test, feature = "test-utils"))]
pub use storage::memory::{InMemoryLogStore, InMemorySnapshotSink, InMemorySnapshotStore};
