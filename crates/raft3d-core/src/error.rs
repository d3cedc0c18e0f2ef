use thiserror::Error;

use crate::model::JobStatus;

/// Domain rejections raised by the validation engine.
///
/// The same variants are returned at submission time and recorded when a
/// committed entry is discarded at apply time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Filament not found: {0}")]
    FilamentNotFound(String),

    #[error("Printer not found: {0}")]
    PrinterNotFound(String),

    #[error("Print job not found: {0}")]
    JobNotFound(String),

    #[error("Insufficient filament {filament_id}: job needs {required}g, {remaining}g remaining")]
    InsufficientFilament {
        filament_id: String,
        required: u32,
        remaining: u32,
    },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("New print jobs must be queued, got {0}")]
    InvalidInitialStatus(JobStatus),

    #[error("Field {0} cannot change after a print job is created")]
    ImmutableField(&'static str),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// A log entry whose bytes are not a well-formed command envelope.
#[derive(Error, Debug)]
#[error("Malformed command: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported snapshot format {0}")]
    UnsupportedFormat(u32),

    #[error("Snapshot violates invariant: {0}")]
    Invariant(#[from] ValidationError),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot sink error: {0}")]
    Sink(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Log index {got} does not follow last index {last}")]
    NonContiguous { last: u64, got: u64 },

    #[error("Snapshot was canceled")]
    Canceled,

    #[error("Database error: {0}")]
    Database(String),
}
