use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::model::{Filament, PrintJob, Printer};

/// A state-changing operation, as carried in the replicated log.
///
/// On the wire this is `{"type": "<kind>", "data": <record>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Command {
    #[serde(rename = "add_printer")]
    AddPrinter(Printer),
    #[serde(rename = "add_filament")]
    AddFilament(Filament),
    /// Creates a print job or replaces it with an updated full record.
    #[serde(rename = "upsert_printjob")]
    UpsertPrintJob(PrintJob),
}

impl Command {
    /// Serialize the envelope. Field order is fixed by the record types, so
    /// equal commands always encode to equal bytes.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The envelope `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::AddPrinter(_) => "add_printer",
            Command::AddFilament(_) => "add_filament",
            Command::UpsertPrintJob(_) => "upsert_printjob",
        }
    }

    /// Id of the record the command targets.
    pub fn record_id(&self) -> &str {
        match self {
            Command::AddPrinter(p) => &p.id,
            Command::AddFilament(f) => &f.id,
            Command::UpsertPrintJob(j) => &j.id,
        }
    }
}

/// One committed entry of the replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub data: Vec<u8>,
}

impl LogEntry {
    pub fn new(index: u64, term: u64, data: Vec<u8>) -> Self {
        Self { index, term, data }
    }

    /// Build an entry carrying an encoded command.
    pub fn for_command(index: u64, term: u64, command: &Command) -> serde_json::Result<Self> {
        Ok(Self::new(index, term, command.encode()?))
    }

    pub fn command(&self) -> Result<Command, DecodeError> {
        Command::decode(&self.data)
    }
}
