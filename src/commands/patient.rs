//! Minimal patient registry commands.

use chrono::NaiveDate;
use uuid::Uuid;

use super::CommandError;
use crate::core_state::CoreState;
use crate::db;
use crate::models::Patient;

pub fn add_patient(
    state: &CoreState,
    full_name: &str,
    birth_date: Option<NaiveDate>,
) -> Result<Patient, CommandError> {
    let full_name = full_name.trim();
    if full_name.is_empty() {
        return Err(CommandError::InvalidInput("patient name is required".into()));
    }

    let patient = Patient {
        id: Uuid::new_v4(),
        full_name: full_name.to_string(),
        birth_date,
        created_at: chrono::Local::now().naive_local(),
    };
    let conn = state.open_db()?;
    db::insert_patient(&conn, &patient)?;
    tracing::info!(patient_id = %patient.id, "Patient registered");
    Ok(patient)
}

pub fn get_patient(state: &CoreState, patient_id: &Uuid) -> Result<Patient, CommandError> {
    let conn = state.open_db()?;
    db::get_patient(&conn, patient_id)?.ok_or(CommandError::PatientNotFound(*patient_id))
}
