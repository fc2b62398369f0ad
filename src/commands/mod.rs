//! Caller-facing operations.
//!
//! Each command opens its own connection from `CoreState`, checks the
//! patient or exam it targets, and maps lower-layer failures into
//! `CommandError`. Declined operations leave no partial state behind.

pub mod ai_setup;
pub mod exam;
pub mod patient;
pub mod reports;

use uuid::Uuid;

use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::pipeline::import::ImportError;
use crate::pipeline::processor::ProcessingError;
use crate::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Exam not found: {0}")]
    ExamNotFound(Uuid),

    #[error("Invalid upload: {0}")]
    InvalidUpload(#[from] ImportError),

    #[error("Exam {0} is already being processed")]
    AlreadyProcessing(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CommandError {
    /// Stable machine-readable code for callers that switch on failures.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PatientNotFound(_) => "patient_not_found",
            Self::ExamNotFound(_) => "exam_not_found",
            Self::InvalidUpload(_) => "invalid_upload",
            Self::AlreadyProcessing(_) => "already_processing",
            Self::Database(_) | Self::Core(_) | Self::Storage(_) => "internal",
            Self::Processing(ProcessingError::AlreadyClaimed(_)) => "already_processing",
            Self::Processing(_) => "processing",
            Self::Settings(_) => "settings",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

/// Decline the operation unless the patient exists.
pub(crate) fn ensure_patient(
    directory: &dyn crate::db::PatientDirectory,
    patient_id: &Uuid,
) -> Result<(), CommandError> {
    if directory.patient_exists(patient_id)? {
        Ok(())
    } else {
        Err(CommandError::PatientNotFound(*patient_id))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        let id = Uuid::new_v4();
        assert_eq!(CommandError::PatientNotFound(id).code(), "patient_not_found");
        assert_eq!(CommandError::AlreadyProcessing(id).code(), "already_processing");
        assert_eq!(
            CommandError::Processing(ProcessingError::AlreadyClaimed(id)).code(),
            "already_processing"
        );
        assert_eq!(CommandError::InvalidUpload(ImportError::EmptyFile).code(), "invalid_upload");
    }
}
