use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

use crate::models::enums::{ExamStatus, ValueFlag};
use crate::models::Exam;

/// Trend request: optional parameter filter plus lookback window.
#[derive(Debug, Clone, Serialize)]
pub struct TrendQuery {
    pub parameter: Option<String>,
    pub months: u32,
}

impl Default for TrendQuery {
    fn default() -> Self {
        Self {
            parameter: None,
            months: 12,
        }
    }
}

/// One measurement on a trend line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub parameter: String,
    pub unit: String,
    pub reference: String,
    pub exam_id: Uuid,
    pub exam_type: Option<String>,
}

/// Time-ordered series for one parameter name.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterTrend {
    pub parameter: String,
    pub occurrences: u32,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrendView {
    /// Values whose parameter contains the requested filter.
    Filtered {
        parameter: String,
        points: Vec<TrendPoint>,
    },
    /// The most frequent parameters, each with its own series.
    TopParameters { trends: Vec<ParameterTrend> },
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendReport {
    pub view: TrendView,
    /// Distinct parameter names in the window, first-seen order.
    pub available_parameters: Vec<String>,
    pub period_months: u32,
}

// ── Patient summary ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExamCounts {
    pub total: u32,
    pub completed: u32,
    pub pending: u32,
    pub processing: u32,
    pub error: u32,
    pub recent: u32,
    /// Percentage of exams completed, one decimal.
    pub completion_rate: f64,
}

/// Compact view of an exam for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ExamBrief {
    pub id: Uuid,
    pub original_filename: String,
    pub exam_type: Option<String>,
    pub exam_date: Option<NaiveDate>,
    pub status: ExamStatus,
    pub created_at: NaiveDateTime,
}

impl From<&Exam> for ExamBrief {
    fn from(exam: &Exam) -> Self {
        Self {
            id: exam.id,
            original_filename: exam.file.original_filename.clone(),
            exam_type: exam.metadata.exam_type.clone(),
            exam_date: exam.metadata.exam_date,
            status: exam.status(),
            created_at: exam.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentAlteredValue {
    pub parameter: String,
    pub value: f64,
    pub unit: String,
    pub reference: String,
    pub flag: ValueFlag,
    pub exam_id: Uuid,
    pub exam_date: Option<NaiveDate>,
    pub exam_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryAlerts {
    pub pending_exams: bool,
    pub error_exams: bool,
    pub no_recent_exams: bool,
    pub altered_values: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub counts: ExamCounts,
    pub last_exam: Option<ExamBrief>,
    pub exam_types: Vec<String>,
    pub laboratories: Vec<String>,
    pub recent_altered_values: Vec<RecentAlteredValue>,
    pub alerts: SummaryAlerts,
}

// ── Medical record ────────────────────────────────────────────────────────

/// Bounds apply to the exam date; exams without one are excluded once a
/// bound is set.
#[derive(Debug, Clone, Default)]
pub struct MedicalRecordFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub exam_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordStatistics {
    pub total_exams: u32,
    pub completed_exams: u32,
    pub recent_exams: u32,
    pub completion_rate: f64,
    pub exam_types: Vec<String>,
    pub labs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MedicalRecord {
    pub exams: Vec<Exam>,
    pub statistics: RecordStatistics,
}

// ── Timeline ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    PatientCreated,
    ExamUploaded,
}

/// Status-derived severity of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Completed,
    InProgress,
    Failed,
}

impl From<ExamStatus> for EventSeverity {
    fn from(status: ExamStatus) -> Self {
        match status {
            ExamStatus::Completed => Self::Completed,
            ExamStatus::Pending | ExamStatus::Processing => Self::InProgress,
            ExamStatus::Error => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub id: String,
    pub event_type: TimelineEventType,
    pub title: String,
    pub description: String,
    pub date: NaiveDateTime,
    pub exam_date: Option<NaiveDate>,
    pub severity: EventSeverity,
    pub exam_id: Option<Uuid>,
    pub has_results: bool,
}
