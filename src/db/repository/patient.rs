use chrono::NaiveDate;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::Patient;

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, full_name, birth_date, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            patient.id.to_string(),
            patient.full_name,
            patient.birth_date.map(|d| d.to_string()),
            format_timestamp(&patient.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, full_name, birth_date, created_at FROM patients WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    );

    match result {
        Ok((id, full_name, birth_date, created_at)) => Ok(Some(Patient {
            id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            full_name,
            birth_date: birth_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            created_at: parse_timestamp(&created_at),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn patient_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM patients WHERE id = ?1)",
        params![id.to_string()],
        |row| row.get::<_, bool>(0),
    )?;
    Ok(exists)
}

/// Patient existence lookup, the only patient operation exam processing needs.
pub trait PatientDirectory {
    fn patient_exists(&self, id: &Uuid) -> Result<bool, DatabaseError>;
}

impl PatientDirectory for Connection {
    fn patient_exists(&self, id: &Uuid) -> Result<bool, DatabaseError> {
        patient_exists(self, id)
    }
}
