use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A 3D printer. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Printer {
    pub id: String,
    pub company: String,
    pub model: String,
}

impl Printer {
    pub fn new(id: impl Into<String>, company: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            company: company.into(),
            model: model.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_id("printer", &self.id)
    }
}

/// A filament spool (PLA, PETG, ...).
///
/// `remaining_weight_grams` never exceeds `total_weight_grams`; it only
/// decreases when a print job consuming the spool completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filament {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub color: String,
    pub total_weight_grams: u32,
    pub remaining_weight_grams: u32,
}

impl Filament {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        color: impl Into<String>,
        total_weight_grams: u32,
        remaining_weight_grams: u32,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            color: color.into(),
            total_weight_grams,
            remaining_weight_grams,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_id("filament", &self.id)?;
        if self.remaining_weight_grams > self.total_weight_grams {
            return Err(ValidationError::InvalidRecord(format!(
                "filament {}: remaining weight {}g exceeds total weight {}g",
                self.id, self.remaining_weight_grams, self.total_weight_grams
            )));
        }
        Ok(())
    }

    /// Remaining weight after consuming `grams`, if enough is left.
    pub fn after_consuming(&self, grams: u32) -> Option<u32> {
        self.remaining_weight_grams.checked_sub(grams)
    }
}

/// Lifecycle of a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Canceled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Canceled)
    }

    /// Whether `self -> next` is an edge of the status graph:
    /// queued -> running -> done, and queued|running -> canceled.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        valid_transition(*self, next)
    }
}

/// The only legal status edges. `done` and `canceled` are terminal.
pub fn valid_transition(current: JobStatus, requested: JobStatus) -> bool {
    matches!(
        (current, requested),
        (JobStatus::Queued, JobStatus::Running)
            | (JobStatus::Running, JobStatus::Done)
            | (JobStatus::Queued, JobStatus::Canceled)
            | (JobStatus::Running, JobStatus::Canceled)
    )
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidStatus(s.to_string()))
    }
}

/// A print job: one file printed on one printer from one filament spool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: String,
    pub printer_id: String,
    pub filament_id: String,
    #[serde(rename = "filepath")]
    pub file_path: String,
    pub print_weight_grams: u32,
    pub status: JobStatus,
}

impl PrintJob {
    pub fn new(
        id: impl Into<String>,
        printer_id: impl Into<String>,
        filament_id: impl Into<String>,
        file_path: impl Into<String>,
        print_weight_grams: u32,
    ) -> Self {
        Self {
            id: id.into(),
            printer_id: printer_id.into(),
            filament_id: filament_id.into(),
            file_path: file_path.into(),
            print_weight_grams,
            status: JobStatus::Queued,
        }
    }

    /// The same job with a different status.
    pub fn with_status(&self, status: JobStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_id("print job", &self.id)?;
        require_id("printer", &self.printer_id)?;
        require_id("filament", &self.filament_id)
    }

    /// Name of the first field other than `status` that differs from `other`.
    pub fn changed_immutable_field(&self, other: &PrintJob) -> Option<&'static str> {
        if self.printer_id != other.printer_id {
            Some("printer_id")
        } else if self.filament_id != other.filament_id {
            Some("filament_id")
        } else if self.file_path != other.file_path {
            Some("filepath")
        } else if self.print_weight_grams != other.print_weight_grams {
            Some("print_weight_grams")
        } else {
            None
        }
    }
}

fn require_id(what: &str, id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::InvalidRecord(format!("{what} id cannot be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(valid_transition(JobStatus::Queued, JobStatus::Running));
        assert!(valid_transition(JobStatus::Running, JobStatus::Done));
        assert!(valid_transition(JobStatus::Queued, JobStatus::Canceled));
        assert!(valid_transition(JobStatus::Running, JobStatus::Canceled));
    }

    #[test]
    fn test_only_four_edges_are_legal() {
        let legal = JobStatus::ALL
            .iter()
            .flat_map(|from| JobStatus::ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| valid_transition(*from, *to))
            .count();
        assert_eq!(legal, 4);
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for next in JobStatus::ALL {
            assert!(!JobStatus::Done.can_transition_to(next));
            assert!(!JobStatus::Canceled.can_transition_to(next));
        }
        assert!(JobStatus::Done.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("running".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert_eq!("done".parse::<JobStatus>().unwrap(), JobStatus::Done);
        // Only the exact lowercase names are statuses.
        for s in ["RUNNING", "Done", " queued ", ""] {
            assert_eq!(
                s.parse::<JobStatus>(),
                Err(ValidationError::InvalidStatus(s.to_string()))
            );
        }
        assert_eq!(
            "paused".parse::<JobStatus>(),
            Err(ValidationError::InvalidStatus("paused".to_string()))
        );
    }

    #[test]
    fn test_wire_field_names() {
        let job = PrintJob::new("j1", "p1", "f1", "/models/benchy.gcode", 40);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["filepath"], "/models/benchy.gcode");
        assert_eq!(json["status"], "queued");

        let filament = Filament::new("f1", "PLA", "red", 1000, 1000);
        let json = serde_json::to_value(&filament).unwrap();
        assert_eq!(json["type"], "PLA");
        assert_eq!(json["remaining_weight_grams"], 1000);
    }

    #[test]
    fn test_filament_validation() {
        assert!(Filament::new("f1", "PLA", "red", 1000, 1000).validate().is_ok());
        assert!(Filament::new("f1", "PLA", "red", 1000, 0).validate().is_ok());
        assert!(Filament::new("f1", "PLA", "red", 100, 101).validate().is_err());
        assert!(Filament::new("", "PLA", "red", 100, 100).validate().is_err());
    }

    #[test]
    fn test_after_consuming() {
        let filament = Filament::new("f1", "PLA", "red", 1000, 600);
        assert_eq!(filament.after_consuming(600), Some(0));
        assert_eq!(filament.after_consuming(601), None);
    }

    #[test]
    fn test_changed_immutable_field() {
        let job = PrintJob::new("j1", "p1", "f1", "a.gcode", 40);
        assert_eq!(job.changed_immutable_field(&job.with_status(JobStatus::Done)), None);

        let mut heavier = job.clone();
        heavier.print_weight_grams = 41;
        assert_eq!(job.changed_immutable_field(&heavier), Some("print_weight_grams"));
    }
}
