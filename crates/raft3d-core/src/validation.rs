use crate::error::ValidationError;
use crate::model::{Filament, JobStatus, PrintJob, Printer};
use crate::state::FleetState;

/// What an accepted `upsert_printjob` does to the job collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobChange {
    Created,
    Transitioned { from: JobStatus, to: JobStatus },
}

/// Validation engine. Every check reads the given state and never mutates it,
/// so the dispatcher and the state machine reach the same verdict for the
/// same state.
pub struct Validator;

impl Validator {
    pub fn validate_printer(printer: &Printer) -> Result<(), ValidationError> {
        printer.validate()
    }

    pub fn validate_filament(filament: &Filament) -> Result<(), ValidationError> {
        filament.validate()
    }

    /// Creation checks for a job that is not yet in `state`.
    pub fn validate_new_job(state: &FleetState, job: &PrintJob) -> Result<(), ValidationError> {
        job.validate()?;

        let filament = state
            .filament(&job.filament_id)
            .ok_or_else(|| ValidationError::FilamentNotFound(job.filament_id.clone()))?;
        Self::check_stock(filament, job.print_weight_grams)?;

        if state.printer(&job.printer_id).is_none() {
            return Err(ValidationError::PrinterNotFound(job.printer_id.clone()));
        }

        if job.status != JobStatus::Queued {
            return Err(ValidationError::InvalidInitialStatus(job.status));
        }
        Ok(())
    }

    /// Transition checks for a status change requested by id. Returns the full
    /// replacement record to submit.
    pub fn validate_transition(
        state: &FleetState,
        job_id: &str,
        requested: &str,
    ) -> Result<PrintJob, ValidationError> {
        let current = state
            .print_job(job_id)
            .ok_or_else(|| ValidationError::JobNotFound(job_id.to_string()))?;
        let requested: JobStatus = requested.parse()?;

        let updated = current.with_status(requested);
        Self::check_edge(state, current, &updated)?;
        Ok(updated)
    }

    /// Checks for a full `upsert_printjob` record: creation when the id is
    /// new, status transition otherwise.
    pub fn validate_upsert(state: &FleetState, job: &PrintJob) -> Result<JobChange, ValidationError> {
        match state.print_job(&job.id) {
            None => {
                Self::validate_new_job(state, job)?;
                Ok(JobChange::Created)
            }
            Some(current) => {
                if let Some(field) = current.changed_immutable_field(job) {
                    return Err(ValidationError::ImmutableField(field));
                }
                Self::check_edge(state, current, job)?;
                Ok(JobChange::Transitioned {
                    from: current.status,
                    to: job.status,
                })
            }
        }
    }

    fn check_edge(
        state: &FleetState,
        current: &PrintJob,
        updated: &PrintJob,
    ) -> Result<(), ValidationError> {
        if !current.status.can_transition_to(updated.status) {
            return Err(ValidationError::IllegalTransition {
                from: current.status,
                to: updated.status,
            });
        }

        // Completion consumes stock; the spool must still cover the job.
        if updated.status == JobStatus::Done {
            let filament = state
                .filament(&updated.filament_id)
                .ok_or_else(|| ValidationError::FilamentNotFound(updated.filament_id.clone()))?;
            Self::check_stock(filament, updated.print_weight_grams)?;
        }
        Ok(())
    }

    fn check_stock(filament: &Filament, required: u32) -> Result<(), ValidationError> {
        if filament.after_consuming(required).is_none() {
            return Err(ValidationError::InsufficientFilament {
                filament_id: filament.id.clone(),
                required,
                remaining: filament.remaining_weight_grams,
            });
        }
        Ok(())
    }
}
