//! Exam processing state machine.
//!
//! Drives one exam pending → processing → completed | error:
//! extract text → structure values → evaluate references → persist.
//!
//! Engines are injected as trait objects so the whole run can be exercised
//! with mocks.

use std::panic::{self, AssertUnwindSafe};

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{AnalysisConfig, AppConfig};
use crate::db::{self, DatabaseError};
use crate::models::enums::{ExamStatus, ExtractionSource};
use crate::models::{Exam, ExamMetadata, ExamResults};
use crate::pipeline::extraction::pdf::panic_message;
use crate::pipeline::extraction::{
    OcrEngine, PdfTextExtractor, RawTextExtractor, TextExtractor, UnavailableOcr,
};
use crate::pipeline::reference::{ReferenceError, ReferenceTable};
use crate::pipeline::structuring::{ExamStructurer, LlmClient, OpenAiClient, StructuringError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that decline or abort a processing run before an outcome is recorded.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Exam not found: {0}")]
    ExamNotFound(Uuid),

    #[error("Exam {0} is not pending; another run already claimed it")]
    AlreadyClaimed(Uuid),

    #[error("Reference table error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Analysis client setup failed: {0}")]
    AnalysisClient(#[from] StructuringError),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What a run ended with.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub exam_id: Uuid,
    pub status: ExamStatus,
    pub value_count: usize,
    pub altered_count: usize,
    pub source: Option<ExtractionSource>,
    pub text_is_placeholder: bool,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ExamProcessor {
    extractor: Box<dyn TextExtractor + Send + Sync>,
    structurer: ExamStructurer,
    references: ReferenceTable,
}

impl ExamProcessor {
    pub fn new(
        extractor: Box<dyn TextExtractor + Send + Sync>,
        structurer: ExamStructurer,
        references: ReferenceTable,
    ) -> Self {
        Self {
            extractor,
            structurer,
            references,
        }
    }

    pub fn has_external_analysis(&self) -> bool {
        self.structurer.has_external()
    }

    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    /// Run the pipeline for one pending exam, stamping each transition with
    /// the wall clock at the moment it happens.
    pub fn process(&self, conn: &Connection, exam_id: &Uuid) -> Result<ProcessingOutcome, ProcessingError> {
        self.process_with_clock(conn, exam_id, || chrono::Local::now().naive_local())
    }

    /// Same as `process`, with every transition stamped with `now`.
    ///
    /// The pending → processing claim is committed before any work starts.
    /// Extraction failures and panics end in `error`; everything else ends
    /// in `completed`.
    pub fn process_at(
        &self,
        conn: &Connection,
        exam_id: &Uuid,
        now: NaiveDateTime,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        self.process_with_clock(conn, exam_id, || now)
    }

    fn process_with_clock(
        &self,
        conn: &Connection,
        exam_id: &Uuid,
        clock: impl Fn() -> NaiveDateTime,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        let exam = db::get_exam(conn, exam_id)?.ok_or(ProcessingError::ExamNotFound(*exam_id))?;

        if !db::claim_for_processing(conn, exam_id, &clock())? {
            tracing::warn!(exam_id = %exam_id, status = exam.status().as_str(), "Exam not claimable");
            return Err(ProcessingError::AlreadyClaimed(*exam_id));
        }

        let _span = tracing::info_span!("process_exam", exam_id = %exam_id).entered();
        tracing::info!(kind = exam.file.kind.as_str(), "Processing: starting extraction");

        let run = panic::catch_unwind(AssertUnwindSafe(|| self.run_pipeline(&exam)));
        let run = match run {
            Ok(result) => result,
            Err(payload) => Err(format!(
                "Unexpected processing failure: {}",
                panic_message(payload.as_ref())
            )),
        };

        match run {
            Ok((results, metadata)) => {
                db::record_completed(conn, exam_id, &results, &metadata, &clock())?;
                tracing::info!(
                    values = results.values.len(),
                    altered = results.altered_values.len(),
                    source = results.source.as_str(),
                    "Processing complete"
                );
                Ok(ProcessingOutcome {
                    exam_id: *exam_id,
                    status: ExamStatus::Completed,
                    value_count: results.values.len(),
                    altered_count: results.altered_values.len(),
                    source: Some(results.source),
                    text_is_placeholder: results.text_is_placeholder,
                    error: None,
                })
            }
            Err(message) => {
                db::record_error(conn, exam_id, &message, &clock())?;
                tracing::warn!(error = %message, "Processing failed");
                Ok(ProcessingOutcome {
                    exam_id: *exam_id,
                    status: ExamStatus::Error,
                    value_count: 0,
                    altered_count: 0,
                    source: None,
                    text_is_placeholder: false,
                    error: Some(message),
                })
            }
        }
    }

    fn run_pipeline(&self, exam: &Exam) -> Result<(ExamResults, ExamMetadata), String> {
        let raw = self
            .extractor
            .extract(&exam.file.stored_path, exam.file.kind)
            .map_err(|e| e.to_string())?;

        tracing::info!(
            text_length = raw.text.len(),
            placeholder = raw.is_placeholder,
            "Processing: starting structuring"
        );
        let structured = self.structurer.structure(&raw.text, raw.is_placeholder);
        let altered_values = self.references.altered_values(&structured.values);

        let mut metadata = exam.metadata.clone();
        metadata.fill_missing(structured.detected);

        let results = ExamResults {
            extracted_text: raw.text,
            text_is_placeholder: raw.is_placeholder,
            values: structured.values,
            altered_values,
            summary: structured.summary,
            source: structured.source,
            analysis: structured.analysis,
        };
        Ok((results, metadata))
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build an `ExamProcessor` with production implementations.
///
/// - OCR: `BundledTesseract` (feature-gated) or `UnavailableOcr`
/// - PDF: `PdfTextExtractor`
/// - Analysis: `OpenAiClient` when configured, patterns only otherwise
/// - References: JSON table from config, or the built-in seed
pub fn build_processor(
    config: &AppConfig,
    analysis: &AnalysisConfig,
) -> Result<ExamProcessor, ProcessingError> {
    let ocr = build_ocr_engine(&config.ocr_language);
    let pdf = Box::new(PdfTextExtractor);
    let extractor =
        Box::new(RawTextExtractor::new(ocr, pdf).with_language(&config.ocr_language));

    let llm: Option<Box<dyn LlmClient + Send + Sync>> = match analysis {
        AnalysisConfig::Configured(settings) => {
            tracing::info!(model = %settings.model, "Exam processor using external analysis");
            Some(Box::new(OpenAiClient::new(settings)?))
        }
        AnalysisConfig::Unconfigured => {
            tracing::info!("External analysis not configured, using pattern extraction only");
            None
        }
    };

    let references = match &config.reference_ranges_path {
        Some(path) => ReferenceTable::from_json_file(path)?,
        None => ReferenceTable::seed(),
    };

    Ok(ExamProcessor::new(extractor, ExamStructurer::new(llm), references))
}

/// Build the OCR engine, respecting feature flags.
#[cfg_attr(not(feature = "ocr"), allow(unused_variables))]
fn build_ocr_engine(lang: &str) -> Box<dyn OcrEngine + Send + Sync> {
    #[cfg(feature = "ocr")]
    {
        match find_tessdata_dir(lang)
            .and_then(|dir| crate::pipeline::extraction::BundledTesseract::new(&dir, lang).map(|e| (dir, e)))
        {
            Ok((dir, engine)) => {
                tracing::info!(tessdata = %dir.display(), lang, "Tesseract OCR initialized");
                return Box::new(engine);
            }
            Err(e) => tracing::warn!(error = %e, "Tesseract unavailable, images will get placeholder text"),
        }
    }

    tracing::info!("No OCR engine, image exams will record placeholder text");
    Box::new(UnavailableOcr)
}

/// Locate tessdata directory from environment or system paths.
#[cfg(feature = "ocr")]
fn find_tessdata_dir(
    lang: &str,
) -> Result<std::path::PathBuf, crate::pipeline::extraction::ExtractionError> {
    use std::path::PathBuf;

    let primary = lang.split('+').next().unwrap_or(lang);
    let traineddata = format!("{primary}.traineddata");

    if let Ok(path) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&path);
        if p.join(&traineddata).exists() {
            return Ok(p);
        }
    }

    let candidates = [
        "/usr/share/tesseract-ocr/5/tessdata",
        "/usr/share/tesseract-ocr/4.00/tessdata",
        "/usr/share/tessdata",
        "/usr/local/share/tessdata",
        "/opt/homebrew/share/tessdata",
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.join(&traineddata).exists())
        .ok_or_else(|| {
            crate::pipeline::extraction::ExtractionError::TessdataNotFound(PathBuf::from(
                std::env::var("TESSDATA_PREFIX").unwrap_or_default(),
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use chrono::NaiveDate;

    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::FileKind;
    use crate::models::{ExamState, Patient, StoredFile};
    use crate::pipeline::extraction::{
        ExtractionError, MockOcrEngine, MockPdfExtractor, RawText,
    };
    use crate::pipeline::structuring::MockLlmClient;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap()
    }

    fn seed_exam(conn: &Connection, path: &Path, kind: FileKind) -> Exam {
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Maria Souza".into(),
            birth_date: None,
            created_at: now(),
        };
        db::insert_patient(conn, &patient).unwrap();

        let file = StoredFile {
            original_filename: "exame.pdf".into(),
            stored_path: path.to_path_buf(),
            size_bytes: 10,
            kind,
            mime_type: "application/pdf".into(),
            checksum: "abc".into(),
        };
        let exam = Exam::new_pending(patient.id, file, ExamMetadata::default(), now());
        db::insert_exam(conn, &exam).unwrap();
        exam
    }

    fn stored_file(dir: &Path) -> PathBuf {
        let path = dir.join("exam.pdf");
        std::fs::write(&path, b"%PDF-1.4 placeholder").unwrap();
        path
    }

    fn pdf_processor(pages: &[&str]) -> ExamProcessor {
        let extractor = RawTextExtractor::new(
            Box::new(UnavailableOcr),
            Box::new(MockPdfExtractor::with_pages(pages)),
        );
        ExamProcessor::new(Box::new(extractor), ExamStructurer::offline(), ReferenceTable::seed())
    }

    struct PanickingExtractor;

    impl TextExtractor for PanickingExtractor {
        fn extract(&self, _path: &Path, _kind: FileKind) -> Result<RawText, ExtractionError> {
            panic!("decoder blew up");
        }
    }

    #[test]
    fn pdf_exam_completes_with_values_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, &stored_file(dir.path()), FileKind::Pdf);

        let processor = pdf_processor(&["Laboratório Central\nGlicose: 130 mg/dl\nData: 02/04/2024"]);
        let outcome = processor.process_at(&conn, &exam.id, now()).unwrap();

        assert_eq!(outcome.status, ExamStatus::Completed);
        assert!(outcome.value_count >= 1);
        assert_eq!(outcome.altered_count, 1);
        assert_eq!(outcome.source, Some(ExtractionSource::Pattern));

        let stored = db::get_exam(&conn, &exam.id).unwrap().unwrap();
        let results = stored.state.results().unwrap();
        assert!(results.extracted_text.contains("Glicose"));
        assert!(!results.summary.is_empty());
        assert_eq!(results.altered_values[0].flag, crate::models::enums::ValueFlag::High);
        assert_eq!(stored.metadata.exam_date, NaiveDate::from_ymd_opt(2024, 4, 2));
        assert_eq!(stored.processed_at, Some(now()));
    }

    #[test]
    fn processed_at_is_taken_when_the_run_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, &stored_file(dir.path()), FileKind::Pdf);

        let ticks = std::cell::Cell::new(0i64);
        let clock = || {
            ticks.set(ticks.get() + 1);
            now() + chrono::Duration::minutes(ticks.get())
        };
        pdf_processor(&["Glicose: 85 mg/dl"])
            .process_with_clock(&conn, &exam.id, clock)
            .unwrap();

        let stored = db::get_exam(&conn, &exam.id).unwrap().unwrap();
        assert_eq!(stored.processed_at, Some(now() + chrono::Duration::minutes(2)));
    }

    #[test]
    fn wall_clock_run_stamps_processed_at_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, &stored_file(dir.path()), FileKind::Pdf);

        let before = chrono::Local::now().naive_local();
        pdf_processor(&["Glicose: 85 mg/dl"]).process(&conn, &exam.id).unwrap();

        let stored = db::get_exam(&conn, &exam.id).unwrap().unwrap();
        assert!(stored.processed_at.unwrap() >= before - chrono::Duration::seconds(1));
    }

    #[test]
    fn missing_file_ends_in_error_state() {
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, Path::new("/nonexistent/exam.pdf"), FileKind::Pdf);

        let outcome = pdf_processor(&["unused"]).process_at(&conn, &exam.id, now()).unwrap();
        assert_eq!(outcome.status, ExamStatus::Error);
        assert!(outcome.error.as_deref().unwrap().contains("File not found"));

        let stored = db::get_exam(&conn, &exam.id).unwrap().unwrap();
        assert!(stored.state.error_message().unwrap().contains("File not found"));
        assert!(stored.values().is_empty());
    }

    #[test]
    fn pdf_engine_failure_is_recorded_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, &stored_file(dir.path()), FileKind::Pdf);

        let extractor = RawTextExtractor::new(
            Box::new(UnavailableOcr),
            Box::new(MockPdfExtractor::failing("bad xref table")),
        );
        let processor = ExamProcessor::new(
            Box::new(extractor),
            ExamStructurer::offline(),
            ReferenceTable::seed(),
        );
        let outcome = processor.process_at(&conn, &exam.id, now()).unwrap();
        assert_eq!(outcome.status, ExamStatus::Error);
        assert!(outcome.error.unwrap().contains("bad xref table"));
    }

    #[test]
    fn panic_during_run_becomes_error() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, &stored_file(dir.path()), FileKind::Pdf);

        let processor = ExamProcessor::new(
            Box::new(PanickingExtractor),
            ExamStructurer::offline(),
            ReferenceTable::seed(),
        );
        let outcome = processor.process_at(&conn, &exam.id, now()).unwrap();
        assert_eq!(outcome.status, ExamStatus::Error);
        assert!(outcome.error.unwrap().contains("decoder blew up"));
    }

    #[test]
    fn image_without_ocr_completes_with_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"not really a png").unwrap();
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, &path, FileKind::Image);

        let outcome = pdf_processor(&[]).process_at(&conn, &exam.id, now()).unwrap();
        assert_eq!(outcome.status, ExamStatus::Completed);
        assert!(outcome.text_is_placeholder);
        assert_eq!(outcome.value_count, 0);

        let stored = db::get_exam(&conn, &exam.id).unwrap().unwrap();
        assert!(stored.state.results().unwrap().text_is_placeholder);
        assert!(stored.metadata.exam_type.is_none());
    }

    #[test]
    fn image_with_ocr_extracts_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"not really a png").unwrap();
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, &path, FileKind::Image);

        let extractor = RawTextExtractor::new(
            Box::new(MockOcrEngine::new("Hemoglobina: 11,2 g/dl", 0.9)),
            Box::new(MockPdfExtractor::with_pages(&[])),
        );
        let processor = ExamProcessor::new(
            Box::new(extractor),
            ExamStructurer::offline(),
            ReferenceTable::seed(),
        );
        let outcome = processor.process_at(&conn, &exam.id, now()).unwrap();
        assert_eq!(outcome.status, ExamStatus::Completed);

        let stored = db::get_exam(&conn, &exam.id).unwrap().unwrap();
        let altered = &stored.state.results().unwrap().altered_values;
        assert_eq!(altered.len(), 1);
        assert_eq!(altered[0].value, 11.2);
        assert_eq!(altered[0].flag, crate::models::enums::ValueFlag::Low);
    }

    #[test]
    fn external_analysis_fills_metadata_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, &stored_file(dir.path()), FileKind::Pdf);

        let analysis = r#"{"exam_type":"Bioquímica","lab_name":"Lab Vida","summary":"Glicemia elevada."}"#;
        let values = r#"{"values":[{"parameter":"Glicose","value":"130","unit":"mg/dl","reference":"70 - 99","source_line":"Glicose: 130 mg/dl"}]}"#;
        let llm = MockLlmClient::with_responses(&[analysis, values]);

        let extractor = RawTextExtractor::new(
            Box::new(UnavailableOcr),
            Box::new(MockPdfExtractor::with_pages(&["Glicose: 130 mg/dl"])),
        );
        let processor = ExamProcessor::new(
            Box::new(extractor),
            ExamStructurer::new(Some(Box::new(llm))),
            ReferenceTable::seed(),
        );
        let outcome = processor.process_at(&conn, &exam.id, now()).unwrap();
        assert_eq!(outcome.source, Some(ExtractionSource::External));

        let stored = db::get_exam(&conn, &exam.id).unwrap().unwrap();
        let results = stored.state.results().unwrap();
        assert_eq!(results.summary, "Glicemia elevada.");
        assert_eq!(results.values.len(), 1);
        assert_eq!(stored.metadata.lab_name.as_deref(), Some("Lab Vida"));
        assert_eq!(
            results.altered_values[0].range_source,
            crate::models::enums::RangeSource::Document
        );
    }

    #[test]
    fn second_run_is_declined() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let exam = seed_exam(&conn, &stored_file(dir.path()), FileKind::Pdf);
        let processor = pdf_processor(&["Glicose: 85 mg/dl"]);

        processor.process_at(&conn, &exam.id, now()).unwrap();
        let again = processor.process_at(&conn, &exam.id, now());
        assert!(matches!(again, Err(ProcessingError::AlreadyClaimed(id)) if id == exam.id));
    }

    #[test]
    fn unknown_exam_is_not_found() {
        let conn = open_memory_database().unwrap();
        let result = pdf_processor(&[]).process_at(&conn, &Uuid::new_v4(), now());
        assert!(matches!(result, Err(ProcessingError::ExamNotFound(_))));
    }

    #[test]
    fn uploader_metadata_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_memory_database().unwrap();
        let mut exam = seed_exam(&conn, &stored_file(dir.path()), FileKind::Pdf);
        db::delete_exam(&conn, &exam.id).unwrap();
        exam.metadata.exam_type = Some("Perfil lipídico".into());
        db::insert_exam(&conn, &exam).unwrap();

        pdf_processor(&["Hemograma completo\nHemoglobina: 14 g/dl"])
            .process_at(&conn, &exam.id, now())
            .unwrap();
        let stored = db::get_exam(&conn, &exam.id).unwrap().unwrap();
        assert_eq!(stored.metadata.exam_type.as_deref(), Some("Perfil lipídico"));
        assert!(matches!(stored.state, ExamState::Completed(_)));
    }

    #[test]
    fn build_processor_without_credential_is_offline() {
        let app = AppConfig::with_data_dir(Path::new("/tmp"));
        let processor = build_processor(&app, &AnalysisConfig::Unconfigured).unwrap();
        assert!(!processor.has_external_analysis());
        assert!(processor.references().lookup("Glicose").is_some());
    }
}
