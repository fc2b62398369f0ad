//! Read-only patient reports: trends, summary, medical record, timeline.

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use super::CommandError;
use crate::core_state::CoreState;
use crate::db;
use crate::models::Patient;
use crate::trends::{
    self, MedicalRecord, MedicalRecordFilter, PatientSummary, TimelineEvent, TrendQuery, TrendReport,
};

/// Longest lookback accepted for trends, in months.
pub const MAX_TREND_MONTHS: u32 = 120;

/// A report together with the patient it describes.
#[derive(Debug, Clone, Serialize)]
pub struct PatientReport<T> {
    pub patient: Patient,
    pub report: T,
}

fn load_patient(conn: &rusqlite::Connection, patient_id: &Uuid) -> Result<Patient, CommandError> {
    db::get_patient(conn, patient_id)?.ok_or(CommandError::PatientNotFound(*patient_id))
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub fn patient_trends(
    state: &CoreState,
    patient_id: &Uuid,
    query: &TrendQuery,
) -> Result<PatientReport<TrendReport>, CommandError> {
    patient_trends_at(state, patient_id, query, now())
}

pub fn patient_trends_at(
    state: &CoreState,
    patient_id: &Uuid,
    query: &TrendQuery,
    now: NaiveDateTime,
) -> Result<PatientReport<TrendReport>, CommandError> {
    if query.months == 0 || query.months > MAX_TREND_MONTHS {
        return Err(CommandError::InvalidInput(format!(
            "months must be between 1 and {MAX_TREND_MONTHS}"
        )));
    }
    let conn = state.open_db()?;
    let patient = load_patient(&conn, patient_id)?;
    let report = trends::load_parameter_trends(&conn, patient_id, query, now)?;
    Ok(PatientReport { patient, report })
}

pub fn patient_summary(
    state: &CoreState,
    patient_id: &Uuid,
) -> Result<PatientReport<PatientSummary>, CommandError> {
    patient_summary_at(state, patient_id, now())
}

pub fn patient_summary_at(
    state: &CoreState,
    patient_id: &Uuid,
    now: NaiveDateTime,
) -> Result<PatientReport<PatientSummary>, CommandError> {
    let conn = state.open_db()?;
    let patient = load_patient(&conn, patient_id)?;
    let report = trends::load_patient_summary(&conn, patient_id, now)?;
    Ok(PatientReport { patient, report })
}

pub fn medical_record(
    state: &CoreState,
    patient_id: &Uuid,
    filter: &MedicalRecordFilter,
) -> Result<PatientReport<MedicalRecord>, CommandError> {
    let conn = state.open_db()?;
    let patient = load_patient(&conn, patient_id)?;
    let report = trends::load_medical_record(&conn, patient_id, filter, now())?;
    Ok(PatientReport { patient, report })
}

pub fn patient_timeline(
    state: &CoreState,
    patient_id: &Uuid,
) -> Result<PatientReport<Vec<TimelineEvent>>, CommandError> {
    let conn = state.open_db()?;
    let patient = load_patient(&conn, patient_id)?;
    let report = trends::load_patient_timeline(&conn, &patient)?;
    Ok(PatientReport { patient, report })
}
