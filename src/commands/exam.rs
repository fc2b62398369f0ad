//! Exam lifecycle commands: upload, read, list, reprocess, delete, stats.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

use super::{ensure_patient, CommandError};
use crate::core_state::CoreState;
use crate::db::{self, ExamListFilter, ProcessingStats, ResetOutcome};
use crate::models::enums::FileKind;
use crate::models::{Exam, ExamMetadata};
use crate::pipeline::import::{self, StorageStats};
use crate::pipeline::processor::ProcessingOutcome;

/// A processing marker older than this is treated as a crashed run.
pub const STALE_PROCESSING_MINUTES: i64 = 30;

/// Everything an upload carries besides the patient.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub original_filename: String,
    pub content: Vec<u8>,
    /// Caller's kind tag; checked against the bytes when given.
    pub declared_kind: Option<FileKind>,
    /// Uploader hints. Never overwritten by detection.
    pub metadata: ExamMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub exam: Exam,
    pub outcome: ProcessingOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamPage {
    pub exams: Vec<Exam>,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamStats {
    pub processing: ProcessingStats,
    pub storage: StorageStats,
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Store an upload, create its exam and process it before returning.
///
/// If anything fails after the file is written, the record and the file
/// are both removed before the error is reported. Extraction failures are
/// not failures here: the exam is returned in `error` state.
pub fn upload_exam(
    state: &CoreState,
    patient_id: &Uuid,
    request: UploadRequest,
) -> Result<UploadResult, CommandError> {
    let conn = state.open_db()?;
    ensure_patient(&conn, patient_id)?;

    let stored = import::store_upload(
        &state.config.uploads_dir(),
        patient_id,
        &request.original_filename,
        &request.content,
        state.config.max_upload_bytes,
        request.declared_kind,
    )?;
    let stored_path = stored.stored_path.clone();

    let exam = Exam::new_pending(*patient_id, stored, request.metadata, now());
    let exam_id = exam.id;

    let processed = db::insert_exam(&conn, &exam)
        .map_err(CommandError::from)
        .and_then(|()| {
            let processor = state.processor()?;
            Ok(processor.process(&conn, &exam_id)?)
        });

    let outcome = match processed {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(exam_id = %exam_id, error = %e, "Upload failed, rolling back");
            if let Err(cleanup) = db::delete_exam(&conn, &exam_id) {
                tracing::debug!(error = %cleanup, "No exam record to roll back");
            }
            if let Err(cleanup) = import::remove_stored_file(&stored_path) {
                tracing::warn!(error = %cleanup, "Could not remove stored upload");
            }
            return Err(e);
        }
    };

    let exam = db::get_exam(&conn, &exam_id)?.ok_or(CommandError::ExamNotFound(exam_id))?;
    tracing::info!(
        exam_id = %exam_id,
        patient_id = %patient_id,
        status = outcome.status.as_str(),
        "Exam uploaded"
    );
    Ok(UploadResult { exam, outcome })
}

/// Upload a file from local storage.
pub fn upload_exam_from_path(
    state: &CoreState,
    patient_id: &Uuid,
    path: &Path,
    declared_kind: Option<FileKind>,
    metadata: ExamMetadata,
) -> Result<UploadResult, CommandError> {
    let content = import::read_source(path)?;
    let original_filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    upload_exam(
        state,
        patient_id,
        UploadRequest {
            original_filename,
            content,
            declared_kind,
            metadata,
        },
    )
}

pub fn get_exam(state: &CoreState, exam_id: &Uuid) -> Result<Exam, CommandError> {
    let conn = state.open_db()?;
    db::get_exam(&conn, exam_id)?.ok_or(CommandError::ExamNotFound(*exam_id))
}

/// A patient's exams, newest first, with the unpaginated total.
pub fn list_patient_exams(
    state: &CoreState,
    patient_id: &Uuid,
    filter: &ExamListFilter,
) -> Result<ExamPage, CommandError> {
    let conn = state.open_db()?;
    ensure_patient(&conn, patient_id)?;

    let exams = db::list_patient_exams(&conn, patient_id, filter)?;
    let total = db::count_patient_exams(&conn, patient_id, filter.status)?;
    Ok(ExamPage { exams, total })
}

/// Clear derived data and move the exam back to pending.
///
/// Declined with `AlreadyProcessing` while a run is in flight, unless its
/// marker is older than `STALE_PROCESSING_MINUTES`.
fn reset_exam(conn: &rusqlite::Connection, exam_id: &Uuid) -> Result<(), CommandError> {
    let now = now();
    let stale_before = now - Duration::minutes(STALE_PROCESSING_MINUTES);
    match db::reset_for_reprocess(conn, exam_id, &now, &stale_before)? {
        ResetOutcome::Reset => {
            tracing::info!(exam_id = %exam_id, "Exam reset for reprocessing");
            Ok(())
        }
        ResetOutcome::InFlight => Err(CommandError::AlreadyProcessing(*exam_id)),
        ResetOutcome::NotFound => Err(CommandError::ExamNotFound(*exam_id)),
    }
}

/// Reset and process the exam again, waiting for the result.
pub fn reprocess_exam(state: &CoreState, exam_id: &Uuid) -> Result<ProcessingOutcome, CommandError> {
    let conn = state.open_db()?;
    reset_exam(&conn, exam_id)?;
    let processor = state.processor()?;
    Ok(processor.process(&conn, exam_id)?)
}

/// Reset the exam now and process it on a background thread.
///
/// The returned handle may be dropped; the thread logs its own outcome.
pub fn reprocess_exam_detached(
    state: &Arc<CoreState>,
    exam_id: &Uuid,
) -> Result<JoinHandle<()>, CommandError> {
    let conn = state.open_db()?;
    reset_exam(&conn, exam_id)?;
    drop(conn);

    let processor = state.processor()?;
    let db_path = state.db_path();
    let exam_id = *exam_id;

    let handle = std::thread::spawn(move || {
        let result = db::open_database(&db_path)
            .map_err(CommandError::from)
            .and_then(|conn| Ok(processor.process(&conn, &exam_id)?));
        match result {
            Ok(outcome) => tracing::info!(
                exam_id = %exam_id,
                status = outcome.status.as_str(),
                "Detached reprocess finished"
            ),
            Err(e) => tracing::warn!(exam_id = %exam_id, error = %e, "Detached reprocess failed"),
        }
    });
    Ok(handle)
}

/// Delete the exam record and its stored file together.
pub fn delete_exam(state: &CoreState, exam_id: &Uuid) -> Result<(), CommandError> {
    let conn = state.open_db()?;
    let exam = db::get_exam(&conn, exam_id)?.ok_or(CommandError::ExamNotFound(*exam_id))?;

    let tx = conn.unchecked_transaction().map_err(db::DatabaseError::from)?;
    db::delete_exam(&tx, exam_id)?;
    import::remove_stored_file(&exam.file.stored_path)
        .map_err(|e| CommandError::Storage(e.to_string()))?;
    tx.commit().map_err(db::DatabaseError::from)?;

    tracing::info!(exam_id = %exam_id, "Exam deleted");
    Ok(())
}

pub fn exam_stats(state: &CoreState) -> Result<ExamStats, CommandError> {
    let conn = state.open_db()?;
    Ok(ExamStats {
        processing: db::processing_stats(&conn)?,
        storage: import::storage_stats(&state.config.uploads_dir())
            .map_err(|e| CommandError::Storage(e.to_string()))?,
    })
}
