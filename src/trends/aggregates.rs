use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use super::types::*;
use crate::db::{self, DatabaseError, ExamListFilter};
use crate::models::enums::ExamStatus;
use crate::models::{Exam, ExtractedValue, Patient};
use crate::pipeline::reference::normalize_name;

/// Number of most frequent parameters charted when no filter is given.
pub const TOP_PARAMETER_COUNT: usize = 5;
/// "Recent" means created within this many days.
pub const RECENT_DAYS: i64 = 30;
/// Cap on altered values reported by the patient summary.
pub const RECENT_ALTERED_LIMIT: usize = 10;

// ── Trends ────────────────────────────────────────────────────────────────

/// Build trend series from a patient's exams.
///
/// Only completed exams with at least one value, uploaded within
/// `months × 30` days before `now`, take part. Points are dated by exam date.
pub fn parameter_trends(exams: &[Exam], query: &TrendQuery, now: NaiveDateTime) -> TrendReport {
    let window = exams_in_window(exams, query.months, now);
    let available_parameters = available_parameters(&window);

    let filter = query
        .parameter
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let view = match filter {
        Some(parameter) => {
            let needle = normalize_name(parameter);
            let points = series(&window, |name| normalize_name(name).contains(&needle));
            TrendView::Filtered {
                parameter: parameter.to_string(),
                points,
            }
        }
        None => TrendView::TopParameters {
            trends: top_parameters(&window, TOP_PARAMETER_COUNT),
        },
    };

    TrendReport {
        view,
        available_parameters,
        period_months: query.months,
    }
}

/// Completed exams with values uploaded inside the window, ordered by exam date.
fn exams_in_window(exams: &[Exam], months: u32, now: NaiveDateTime) -> Vec<&Exam> {
    let cutoff = now.date() - Duration::days(i64::from(months) * 30);
    let mut window: Vec<&Exam> = exams
        .iter()
        .filter(|e| e.status() == ExamStatus::Completed)
        .filter(|e| !e.values().is_empty())
        .filter(|e| e.created_at.date() >= cutoff)
        .collect();
    window.sort_by(|a, b| {
        a.effective_date()
            .cmp(&b.effective_date())
            .then(a.created_at.cmp(&b.created_at))
    });
    window
}

/// An exam's values with repeated `(parameter, value)` pairs dropped.
fn distinct_values(exam: &Exam) -> Vec<&ExtractedValue> {
    let mut seen = HashSet::new();
    exam.values()
        .iter()
        .filter(|v| seen.insert((v.parameter.trim().to_string(), v.value.clone())))
        .collect()
}

fn available_parameters(window: &[&Exam]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for exam in window {
        for value in exam.values() {
            let name = value.parameter.trim();
            if !name.is_empty() && seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn series(window: &[&Exam], matches: impl Fn(&str) -> bool) -> Vec<TrendPoint> {
    let mut points = Vec::new();
    for exam in window {
        for value in distinct_values(exam) {
            if !matches(value.parameter.trim()) {
                continue;
            }
            // Unparseable numbers are skipped individually.
            if let Some(point) = trend_point(exam, value) {
                points.push(point);
            }
        }
    }
    points.sort_by(|a, b| a.date.cmp(&b.date));
    points
}

fn trend_point(exam: &Exam, value: &ExtractedValue) -> Option<TrendPoint> {
    Some(TrendPoint {
        date: exam.effective_date(),
        value: value.numeric?,
        parameter: value.parameter.trim().to_string(),
        unit: value.unit.clone(),
        reference: value.reference.clone(),
        exam_id: exam.id,
        exam_type: exam.metadata.exam_type.clone(),
    })
}

/// Most frequent parameter names, ties broken by first appearance.
fn top_parameters(window: &[&Exam], limit: usize) -> Vec<ParameterTrend> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for exam in window {
        for value in distinct_values(exam) {
            let name = value.parameter.trim();
            if name.is_empty() {
                continue;
            }
            let count = counts.entry(name.to_string()).or_insert_with(|| {
                order.push(name.to_string());
                0
            });
            *count += 1;
        }
    }

    let mut ranked: Vec<(usize, &String)> = order.iter().enumerate().collect();
    ranked.sort_by(|(ia, a), (ib, b)| counts[*b].cmp(&counts[*a]).then(ia.cmp(ib)));

    ranked
        .into_iter()
        .take(limit)
        .filter_map(|(_, name)| {
            let points = series(window, |candidate| candidate == name.as_str());
            if points.is_empty() {
                return None;
            }
            Some(ParameterTrend {
                parameter: name.clone(),
                occurrences: counts[name],
                points,
            })
        })
        .collect()
}

// ── Patient summary ───────────────────────────────────────────────────────

pub fn patient_summary(exams: &[Exam], now: NaiveDateTime) -> PatientSummary {
    let recent_cutoff = now - Duration::days(RECENT_DAYS);
    let counts = exam_counts(exams, recent_cutoff);

    let mut newest_first: Vec<&Exam> = exams.iter().collect();
    newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let recent_altered_values: Vec<RecentAlteredValue> = newest_first
        .iter()
        .filter(|e| e.created_at >= recent_cutoff)
        .filter_map(|e| e.state.results().map(|r| (e, r)))
        .flat_map(|(exam, results)| {
            results.altered_values.iter().map(move |a| RecentAlteredValue {
                parameter: a.parameter.clone(),
                value: a.value,
                unit: a.unit.clone(),
                reference: a.reference.clone(),
                flag: a.flag,
                exam_id: exam.id,
                exam_date: exam.metadata.exam_date,
                exam_type: exam.metadata.exam_type.clone(),
            })
        })
        .take(RECENT_ALTERED_LIMIT)
        .collect();

    let alerts = SummaryAlerts {
        pending_exams: counts.pending > 0,
        error_exams: counts.error > 0,
        no_recent_exams: counts.recent == 0 && counts.total > 0,
        altered_values: !recent_altered_values.is_empty(),
    };

    PatientSummary {
        last_exam: newest_first.first().map(|e| ExamBrief::from(*e)),
        exam_types: distinct(newest_first.iter().filter_map(|e| e.metadata.exam_type.as_deref())),
        laboratories: distinct(newest_first.iter().filter_map(|e| e.metadata.lab_name.as_deref())),
        recent_altered_values,
        alerts,
        counts,
    }
}

fn exam_counts(exams: &[Exam], recent_cutoff: NaiveDateTime) -> ExamCounts {
    let mut counts = ExamCounts::default();
    for exam in exams {
        counts.total += 1;
        match exam.status() {
            ExamStatus::Pending => counts.pending += 1,
            ExamStatus::Processing => counts.processing += 1,
            ExamStatus::Completed => counts.completed += 1,
            ExamStatus::Error => counts.error += 1,
        }
        if exam.created_at >= recent_cutoff {
            counts.recent += 1;
        }
    }
    counts.completion_rate = completion_rate(counts.completed, counts.total);
    counts
}

/// Percentage with one decimal; zero when there is nothing to complete.
pub fn completion_rate(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(completed) / f64::from(total) * 1000.0).round() / 10.0
}

fn distinct<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .map(str::trim)
        .filter(|s| !s.is_empty() && seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

// ── Medical record ────────────────────────────────────────────────────────

/// Filtered exam listing, newest exam date first, with statistics over the
/// filtered set.
pub fn medical_record(
    exams: Vec<Exam>,
    filter: &MedicalRecordFilter,
    now: NaiveDateTime,
) -> MedicalRecord {
    let type_needle = filter
        .exam_type
        .as_deref()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty());

    let mut exams: Vec<Exam> = exams
        .into_iter()
        .filter(|e| within(e.metadata.exam_date, filter.start_date, filter.end_date))
        .filter(|e| match &type_needle {
            Some(needle) => e
                .metadata
                .exam_type
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(needle.as_str())),
            None => true,
        })
        .collect();
    exams.sort_by(|a, b| {
        b.metadata
            .exam_date
            .cmp(&a.metadata.exam_date)
            .then(b.created_at.cmp(&a.created_at))
    });

    let recent_cutoff = now - Duration::days(RECENT_DAYS);
    let total_exams = exams.len() as u32;
    let completed_exams = exams
        .iter()
        .filter(|e| e.status() == ExamStatus::Completed)
        .count() as u32;
    let statistics = RecordStatistics {
        total_exams,
        completed_exams,
        recent_exams: exams.iter().filter(|e| e.created_at >= recent_cutoff).count() as u32,
        completion_rate: completion_rate(completed_exams, total_exams),
        exam_types: distinct(exams.iter().filter_map(|e| e.metadata.exam_type.as_deref())),
        labs: distinct(exams.iter().filter_map(|e| e.metadata.lab_name.as_deref())),
    };

    MedicalRecord { exams, statistics }
}

fn within(date: Option<NaiveDate>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    if start.is_none() && end.is_none() {
        return true;
    }
    let Some(date) = date else {
        return false;
    };
    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
}

// ── Timeline ──────────────────────────────────────────────────────────────

/// Patient registration plus one upload event per exam, newest first.
pub fn patient_timeline(patient: &Patient, exams: &[Exam]) -> Vec<TimelineEvent> {
    let mut events = Vec::with_capacity(exams.len() + 1);
    events.push(TimelineEvent {
        id: format!("patient_{}", patient.id),
        event_type: TimelineEventType::PatientCreated,
        title: "Patient registered".into(),
        description: format!("Registration of {}", patient.full_name),
        date: patient.created_at,
        exam_date: None,
        severity: EventSeverity::Info,
        exam_id: None,
        has_results: false,
    });

    for exam in exams {
        events.push(TimelineEvent {
            id: format!("exam_{}", exam.id),
            event_type: TimelineEventType::ExamUploaded,
            title: format!("Exam uploaded: {}", exam.file.original_filename),
            description: format!(
                "Type: {} | Status: {}",
                exam.metadata.exam_type.as_deref().unwrap_or("Not specified"),
                exam.status()
            ),
            date: exam.created_at,
            exam_date: exam.metadata.exam_date,
            severity: EventSeverity::from(exam.status()),
            exam_id: Some(exam.id),
            has_results: exam.state.results().is_some(),
        });
    }

    events.sort_by(|a, b| b.date.cmp(&a.date));
    events
}

// ── Loaders ───────────────────────────────────────────────────────────────

pub fn load_parameter_trends(
    conn: &Connection,
    patient_id: &Uuid,
    query: &TrendQuery,
    now: NaiveDateTime,
) -> Result<TrendReport, DatabaseError> {
    let exams = db::list_completed_exams(conn, patient_id)?;
    Ok(parameter_trends(&exams, query, now))
}

pub fn load_patient_summary(
    conn: &Connection,
    patient_id: &Uuid,
    now: NaiveDateTime,
) -> Result<PatientSummary, DatabaseError> {
    let exams = db::list_patient_exams(conn, patient_id, &ExamListFilter::default())?;
    Ok(patient_summary(&exams, now))
}

pub fn load_medical_record(
    conn: &Connection,
    patient_id: &Uuid,
    filter: &MedicalRecordFilter,
    now: NaiveDateTime,
) -> Result<MedicalRecord, DatabaseError> {
    let exams = db::list_patient_exams(conn, patient_id, &ExamListFilter::default())?;
    Ok(medical_record(exams, filter, now))
}

pub fn load_patient_timeline(
    conn: &Connection,
    patient: &Patient,
) -> Result<Vec<TimelineEvent>, DatabaseError> {
    let exams = db::list_patient_exams(conn, &patient.id, &ExamListFilter::default())?;
    Ok(patient_timeline(patient, &exams))
}
