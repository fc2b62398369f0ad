use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ExamStatus, ExtractionSource, FileKind, RangeSource, ValueFlag};

/// One uploaded exam document and everything derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub file: StoredFile,
    pub metadata: ExamMetadata,
    pub state: ExamState,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
}

/// Descriptor of the stored upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub original_filename: String,
    pub stored_path: PathBuf,
    pub size_bytes: u64,
    pub kind: FileKind,
    pub mime_type: String,
    pub checksum: String,
}

/// Clinical metadata, supplied by the uploader or detected from the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExamMetadata {
    pub exam_type: Option<String>,
    pub exam_date: Option<NaiveDate>,
    pub lab_name: Option<String>,
    pub requesting_physician: Option<String>,
}

impl ExamMetadata {
    /// Fill the fields that are still empty from `other`. Present values win.
    pub fn fill_missing(&mut self, other: ExamMetadata) {
        if self.exam_type.is_none() {
            self.exam_type = other.exam_type;
        }
        if self.exam_date.is_none() {
            self.exam_date = other.exam_date;
        }
        if self.lab_name.is_none() {
            self.lab_name = other.lab_name;
        }
        if self.requesting_physician.is_none() {
            self.requesting_physician = other.requesting_physician;
        }
    }
}

/// Processing state. Derived results only exist on `Completed`, the error
/// message only on `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExamState {
    Pending,
    Processing,
    Completed(ExamResults),
    Error { message: String },
}

impl ExamState {
    pub fn status(&self) -> ExamStatus {
        match self {
            Self::Pending => ExamStatus::Pending,
            Self::Processing => ExamStatus::Processing,
            Self::Completed(_) => ExamStatus::Completed,
            Self::Error { .. } => ExamStatus::Error,
        }
    }

    pub fn results(&self) -> Option<&ExamResults> {
        match self {
            Self::Completed(results) => Some(results),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Everything written at the processing -> completed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamResults {
    pub extracted_text: String,
    /// True when the text is the OCR-unavailable placeholder, not real content.
    pub text_is_placeholder: bool,
    pub values: Vec<ExtractedValue>,
    pub altered_values: Vec<AlteredValue>,
    pub summary: String,
    pub source: ExtractionSource,
    /// Raw exam-level analysis returned by the external service, if any.
    pub analysis: Option<serde_json::Value>,
}

/// One clinical measurement parsed from an exam's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    pub parameter: String,
    /// Numeric fragment as found in the text.
    pub value: String,
    /// `value` with a comma decimal separator normalized; `None` if unparseable.
    pub numeric: Option<f64>,
    pub unit: String,
    pub reference: String,
    pub raw_line: String,
}

impl ExtractedValue {
    pub fn new(
        parameter: &str,
        value: &str,
        unit: &str,
        reference: &str,
        raw_line: &str,
    ) -> Self {
        let value = value.trim();
        Self {
            parameter: parameter.trim().to_string(),
            value: value.to_string(),
            numeric: parse_decimal(value),
            unit: unit.trim().to_string(),
            reference: reference.trim().to_string(),
            raw_line: raw_line.trim().to_string(),
        }
    }
}

/// A value classified outside its reference range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlteredValue {
    pub parameter: String,
    pub value: f64,
    pub unit: String,
    pub reference: String,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub flag: ValueFlag,
    pub range_source: RangeSource,
}

/// Parse a numeric fragment, accepting a comma as decimal separator.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

impl Exam {
    /// New exam in `pending` state with no derived data.
    pub fn new_pending(
        patient_id: Uuid,
        file: StoredFile,
        metadata: ExamMetadata,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            file,
            metadata,
            state: ExamState::Pending,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    pub fn status(&self) -> ExamStatus {
        self.state.status()
    }

    /// Exam date if known, otherwise the day the exam was created.
    pub fn effective_date(&self) -> NaiveDate {
        self.metadata.exam_date.unwrap_or_else(|| self.created_at.date())
    }

    pub fn values(&self) -> &[ExtractedValue] {
        self.state
            .results()
            .map(|r| r.values.as_slice())
            .unwrap_or(&[])
    }
}
