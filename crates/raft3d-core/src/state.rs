use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::ValidationError;
use crate::model::{Filament, JobStatus, PrintJob, Printer};
use crate::validation::{JobChange, Validator};

/// The three replicated collections, keyed by record id.
///
/// Ordered maps keep iteration and serialization order independent of
/// insertion order, so equal states serialize to equal bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetState {
    #[serde(default)]
    printers: BTreeMap<String, Printer>,
    #[serde(default)]
    filaments: BTreeMap<String, Filament>,
    #[serde(default, rename = "printjobs")]
    print_jobs: BTreeMap<String, PrintJob>,
}

impl FleetState {
    pub fn printer(&self, id: &str) -> Option<&Printer> {
        self.printers.get(id)
    }

    pub fn filament(&self, id: &str) -> Option<&Filament> {
        self.filaments.get(id)
    }

    pub fn print_job(&self, id: &str) -> Option<&PrintJob> {
        self.print_jobs.get(id)
    }

    pub fn printers(&self) -> impl Iterator<Item = &Printer> {
        self.printers.values()
    }

    pub fn filaments(&self) -> impl Iterator<Item = &Filament> {
        self.filaments.values()
    }

    pub fn print_jobs(&self) -> impl Iterator<Item = &PrintJob> {
        self.print_jobs.values()
    }

    /// Validate `command` against the current state and, if it passes, apply
    /// it. A rejected command leaves the state untouched.
    pub fn apply(&mut self, command: &Command) -> Result<(), ValidationError> {
        match command {
            Command::AddPrinter(printer) => {
                Validator::validate_printer(printer)?;
                self.printers.insert(printer.id.clone(), printer.clone());
            }
            Command::AddFilament(filament) => {
                Validator::validate_filament(filament)?;
                self.filaments.insert(filament.id.clone(), filament.clone());
            }
            Command::UpsertPrintJob(job) => {
                let change = Validator::validate_upsert(self, job)?;
                if let JobChange::Transitioned {
                    to: JobStatus::Done,
                    ..
                } = change
                {
                    self.consume(&job.filament_id, job.print_weight_grams)?;
                }
                self.print_jobs.insert(job.id.clone(), job.clone());
            }
        }
        Ok(())
    }

    fn consume(&mut self, filament_id: &str, grams: u32) -> Result<(), ValidationError> {
        let filament = self
            .filaments
            .get_mut(filament_id)
            .ok_or_else(|| ValidationError::FilamentNotFound(filament_id.to_string()))?;
        let remaining =
            filament
                .after_consuming(grams)
                .ok_or_else(|| ValidationError::InsufficientFilament {
                    filament_id: filament_id.to_string(),
                    required: grams,
                    remaining: filament.remaining_weight_grams,
                })?;
        filament.remaining_weight_grams = remaining;
        Ok(())
    }

    /// Check the invariants that must hold for every reachable state.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        for (id, printer) in &self.printers {
            check_key("printer", id, &printer.id)?;
            printer.validate()?;
        }
        for (id, filament) in &self.filaments {
            check_key("filament", id, &filament.id)?;
            filament.validate()?;
        }
        for (id, job) in &self.print_jobs {
            check_key("print job", id, &job.id)?;
            job.validate()?;
        }
        Ok(())
    }
}

fn check_key(what: &str, key: &str, id: &str) -> Result<(), ValidationError> {
    if key != id {
        return Err(ValidationError::InvalidRecord(format!(
            "{what} stored under key {key} has id {id}"
        )));
    }
    Ok(())
}
