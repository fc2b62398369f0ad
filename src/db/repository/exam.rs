use std::path::PathBuf;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const EXAM_COLUMNS: &str = "id, patient_id, original_filename, stored_path, file_size, file_kind,
     mime_type, checksum, exam_type, exam_date, lab_name, requesting_physician,
     status, extracted_text, text_is_placeholder, extracted_values, altered_values, summary,
     extraction_source, analysis, processing_error, created_at, updated_at, processed_at";

/// Listing options for a patient's exams.
#[derive(Debug, Clone, Default)]
pub struct ExamListFilter {
    pub status: Option<ExamStatus>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Result of a reprocess reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Reset,
    /// The exam is being processed and its marker is not stale.
    InFlight,
    NotFound,
}

/// Exam counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub total: u32,
    pub pending: u32,
    pub processing: u32,
    pub completed: u32,
    pub error: u32,
}

pub fn insert_exam(conn: &Connection, exam: &Exam) -> Result<(), DatabaseError> {
    let state = StateColumns::from_state(&exam.state)?;
    conn.execute(
        &format!(
            "INSERT INTO exams ({EXAM_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)"
        ),
        params![
            exam.id.to_string(),
            exam.patient_id.to_string(),
            exam.file.original_filename,
            exam.file.stored_path.to_string_lossy().to_string(),
            exam.file.size_bytes as i64,
            exam.file.kind.as_str(),
            exam.file.mime_type,
            exam.file.checksum,
            exam.metadata.exam_type,
            exam.metadata.exam_date.map(|d| d.to_string()),
            exam.metadata.lab_name,
            exam.metadata.requesting_physician,
            state.status,
            state.extracted_text,
            state.text_is_placeholder as i32,
            state.values,
            state.altered_values,
            state.summary,
            state.source,
            state.analysis,
            state.error,
            format_timestamp(&exam.created_at),
            format_timestamp(&exam.updated_at),
            exam.processed_at.as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

pub fn get_exam(conn: &Connection, id: &Uuid) -> Result<Option<Exam>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = ?1"))?;

    match stmt.query_row(params![id.to_string()], read_exam_row) {
        Ok(row) => Ok(Some(exam_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// A patient's exams, newest first.
pub fn list_patient_exams(
    conn: &Connection,
    patient_id: &Uuid,
    filter: &ExamListFilter,
) -> Result<Vec<Exam>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams
         WHERE patient_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at DESC, id
         LIMIT ?3 OFFSET ?4"
    ))?;

    let limit = filter.limit.map(i64::from).unwrap_or(-1);
    let rows = stmt.query_map(
        params![
            patient_id.to_string(),
            filter.status.map(|s| s.as_str()),
            limit,
            filter.offset as i64,
        ],
        read_exam_row,
    )?;

    collect_exams(rows)
}

pub fn count_patient_exams(
    conn: &Connection,
    patient_id: &Uuid,
    status: Option<ExamStatus>,
) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM exams WHERE patient_id = ?1 AND (?2 IS NULL OR status = ?2)",
        params![patient_id.to_string(), status.map(|s| s.as_str())],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(count)
}

/// Completed exams of a patient, oldest first.
pub fn list_completed_exams(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Exam>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams
         WHERE patient_id = ?1 AND status = 'completed'
         ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], read_exam_row)?;
    collect_exams(rows)
}

/// Exams waiting for or stuck in processing, oldest first.
pub fn get_pending_processing(conn: &Connection) -> Result<Vec<Exam>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams
         WHERE status IN ('pending', 'processing')
         ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map([], read_exam_row)?;
    collect_exams(rows)
}

/// Move a pending exam to processing. Returns false when the exam was not
/// pending (another run claimed it, or it does not exist).
pub fn claim_for_processing(
    conn: &Connection,
    id: &Uuid,
    now: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE exams SET status = 'processing', updated_at = ?2
         WHERE id = ?1 AND status = 'pending'",
        params![id.to_string(), format_timestamp(now)],
    )?;
    Ok(rows == 1)
}

/// processing -> completed, with results and the final metadata.
pub fn record_completed(
    conn: &Connection,
    id: &Uuid,
    results: &ExamResults,
    metadata: &ExamMetadata,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE exams SET status = 'completed',
         extracted_text = ?2, text_is_placeholder = ?3, extracted_values = ?4,
         altered_values = ?5, summary = ?6, extraction_source = ?7, analysis = ?8,
         processing_error = NULL,
         exam_type = ?9, exam_date = ?10, lab_name = ?11, requesting_physician = ?12,
         updated_at = ?13, processed_at = ?13
         WHERE id = ?1 AND status = 'processing'",
        params![
            id.to_string(),
            results.extracted_text,
            results.text_is_placeholder as i32,
            serde_json::to_string(&results.values)?,
            serde_json::to_string(&results.altered_values)?,
            results.summary,
            results.source.as_str(),
            results.analysis.as_ref().map(|a| a.to_string()),
            metadata.exam_type,
            metadata.exam_date.map(|d| d.to_string()),
            metadata.lab_name,
            metadata.requesting_physician,
            format_timestamp(now),
        ],
    )?;
    ensure_was_processing(rows, id)
}

/// processing -> error. The message is stored verbatim.
pub fn record_error(
    conn: &Connection,
    id: &Uuid,
    message: &str,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE exams SET status = 'error', processing_error = ?2,
         extracted_text = NULL, text_is_placeholder = 0, extracted_values = NULL,
         altered_values = NULL, summary = NULL, extraction_source = NULL, analysis = NULL,
         updated_at = ?3, processed_at = ?3
         WHERE id = ?1 AND status = 'processing'",
        params![id.to_string(), message, format_timestamp(now)],
    )?;
    ensure_was_processing(rows, id)
}

/// Clear derived data and move the exam back to pending.
///
/// Declined while the exam is processing, unless its processing marker was
/// last touched before `stale_before` (a run that died mid-flight).
pub fn reset_for_reprocess(
    conn: &Connection,
    id: &Uuid,
    now: &NaiveDateTime,
    stale_before: &NaiveDateTime,
) -> Result<ResetOutcome, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let rows = tx.execute(
        "UPDATE exams SET status = 'pending',
         extracted_text = NULL, text_is_placeholder = 0, extracted_values = NULL,
         altered_values = NULL, summary = NULL, extraction_source = NULL, analysis = NULL,
         processing_error = NULL, processed_at = NULL, updated_at = ?2
         WHERE id = ?1 AND (status != 'processing' OR updated_at < ?3)",
        params![id.to_string(), format_timestamp(now), format_timestamp(stale_before)],
    )?;

    let outcome = if rows == 1 {
        ResetOutcome::Reset
    } else {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM exams WHERE id = ?1)",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        if exists {
            ResetOutcome::InFlight
        } else {
            ResetOutcome::NotFound
        }
    };
    tx.commit()?;
    Ok(outcome)
}

pub fn delete_exam(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute("DELETE FROM exams WHERE id = ?1", params![id.to_string()])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Exam".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn processing_stats(conn: &Connection) -> Result<ProcessingStats, DatabaseError> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM exams GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?;

    let mut stats = ProcessingStats::default();
    for row in rows {
        let (status, count) = row?;
        match ExamStatus::from_str(&status)? {
            ExamStatus::Pending => stats.pending = count,
            ExamStatus::Processing => stats.processing = count,
            ExamStatus::Completed => stats.completed = count,
            ExamStatus::Error => stats.error = count,
        }
        stats.total += count;
    }
    Ok(stats)
}

fn ensure_was_processing(rows: usize, id: &Uuid) -> Result<(), DatabaseError> {
    if rows == 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "exam {id} is not in processing state"
        )));
    }
    Ok(())
}

fn collect_exams(
    rows: impl Iterator<Item = rusqlite::Result<ExamRow>>,
) -> Result<Vec<Exam>, DatabaseError> {
    let mut exams = Vec::new();
    for row in rows {
        exams.push(exam_from_row(row?)?);
    }
    Ok(exams)
}

// Flattened ExamState as stored in the exams table
struct StateColumns {
    status: &'static str,
    extracted_text: Option<String>,
    text_is_placeholder: bool,
    values: Option<String>,
    altered_values: Option<String>,
    summary: Option<String>,
    source: Option<&'static str>,
    analysis: Option<String>,
    error: Option<String>,
}

impl StateColumns {
    fn from_state(state: &ExamState) -> Result<Self, DatabaseError> {
        let mut columns = Self {
            status: state.status().as_str(),
            extracted_text: None,
            text_is_placeholder: false,
            values: None,
            altered_values: None,
            summary: None,
            source: None,
            analysis: None,
            error: None,
        };
        match state {
            ExamState::Completed(results) => {
                columns.extracted_text = Some(results.extracted_text.clone());
                columns.text_is_placeholder = results.text_is_placeholder;
                columns.values = Some(serde_json::to_string(&results.values)?);
                columns.altered_values = Some(serde_json::to_string(&results.altered_values)?);
                columns.summary = Some(results.summary.clone());
                columns.source = Some(results.source.as_str());
                columns.analysis = results.analysis.as_ref().map(|a| a.to_string());
            }
            ExamState::Error { message } => columns.error = Some(message.clone()),
            ExamState::Pending | ExamState::Processing => {}
        }
        Ok(columns)
    }
}

// Internal row type for Exam mapping
struct ExamRow {
    id: String,
    patient_id: String,
    original_filename: String,
    stored_path: String,
    file_size: i64,
    file_kind: String,
    mime_type: String,
    checksum: String,
    exam_type: Option<String>,
    exam_date: Option<String>,
    lab_name: Option<String>,
    requesting_physician: Option<String>,
    status: String,
    extracted_text: Option<String>,
    text_is_placeholder: i32,
    extracted_values: Option<String>,
    altered_values: Option<String>,
    summary: Option<String>,
    extraction_source: Option<String>,
    analysis: Option<String>,
    processing_error: Option<String>,
    created_at: String,
    updated_at: String,
    processed_at: Option<String>,
}

fn read_exam_row(row: &Row<'_>) -> rusqlite::Result<ExamRow> {
    Ok(ExamRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        original_filename: row.get(2)?,
        stored_path: row.get(3)?,
        file_size: row.get(4)?,
        file_kind: row.get(5)?,
        mime_type: row.get(6)?,
        checksum: row.get(7)?,
        exam_type: row.get(8)?,
        exam_date: row.get(9)?,
        lab_name: row.get(10)?,
        requesting_physician: row.get(11)?,
        status: row.get(12)?,
        extracted_text: row.get(13)?,
        text_is_placeholder: row.get(14)?,
        extracted_values: row.get(15)?,
        altered_values: row.get(16)?,
        summary: row.get(17)?,
        extraction_source: row.get(18)?,
        analysis: row.get(19)?,
        processing_error: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
        processed_at: row.get(23)?,
    })
}

fn exam_from_row(row: ExamRow) -> Result<Exam, DatabaseError> {
    let state = match ExamStatus::from_str(&row.status)? {
        ExamStatus::Pending => ExamState::Pending,
        ExamStatus::Processing => ExamState::Processing,
        ExamStatus::Error => ExamState::Error {
            message: row.processing_error.unwrap_or_default(),
        },
        ExamStatus::Completed => ExamState::Completed(ExamResults {
            extracted_text: row.extracted_text.unwrap_or_default(),
            text_is_placeholder: row.text_is_placeholder != 0,
            values: parse_json_list(row.extracted_values.as_deref())?,
            altered_values: parse_json_list(row.altered_values.as_deref())?,
            summary: row.summary.unwrap_or_default(),
            source: row
                .extraction_source
                .as_deref()
                .and_then(|s| ExtractionSource::from_str(s).ok())
                .unwrap_or(ExtractionSource::Pattern),
            analysis: row
                .analysis
                .as_deref()
                .and_then(|a| serde_json::from_str(a).ok()),
        }),
    };

    Ok(Exam {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        file: StoredFile {
            original_filename: row.original_filename,
            stored_path: PathBuf::from(row.stored_path),
            size_bytes: row.file_size.max(0) as u64,
            kind: FileKind::from_str(&row.file_kind)?,
            mime_type: row.mime_type,
            checksum: row.checksum,
        },
        metadata: ExamMetadata {
            exam_type: row.exam_type,
            exam_date: row
                .exam_date
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            lab_name: row.lab_name,
            requesting_physician: row.requesting_physician,
        },
        state,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
        processed_at: row.processed_at.as_deref().map(parse_timestamp),
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn parse_json_list<T: serde::de::DeserializeOwned>(
    raw: Option<&str>,
) -> Result<Vec<T>, DatabaseError> {
    match raw {
        None => Ok(vec![]),
        Some(s) if s.trim().is_empty() => Ok(vec![]),
        Some(s) => Ok(serde_json::from_str(s)?),
    }
}
