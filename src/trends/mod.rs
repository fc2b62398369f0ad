//! Per-patient aggregation over processed exams.
//!
//! Read-only: trend series by parameter, the patient summary, the filtered
//! medical record and the upload timeline. Everything is recomputed from the
//! persisted exams on each call; `now` is passed in so windows are testable.

mod aggregates;
mod types;

pub use aggregates::*;
pub use types::*;

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{ExtractionSource, FileKind, RangeSource, ValueFlag};
    use crate::models::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    fn now() -> NaiveDateTime {
        ts(2024, 6, 30)
    }

    fn file(name: &str) -> StoredFile {
        StoredFile {
            original_filename: name.into(),
            stored_path: PathBuf::from(format!("/data/uploads/{name}")),
            size_bytes: 100,
            kind: FileKind::Pdf,
            mime_type: "application/pdf".into(),
            checksum: "00".into(),
        }
    }

    fn value(parameter: &str, raw: &str) -> ExtractedValue {
        ExtractedValue::new(parameter, raw, "mg/dl", "", &format!("{parameter}: {raw} mg/dl"))
    }

    fn results(values: Vec<ExtractedValue>, altered: Vec<AlteredValue>) -> ExamResults {
        ExamResults {
            extracted_text: "text".into(),
            text_is_placeholder: false,
            values,
            altered_values: altered,
            summary: "Exam with few analyzed parameters.".into(),
            source: ExtractionSource::Pattern,
            analysis: None,
        }
    }

    fn completed(values: &[(&str, &str)], exam_date: Option<NaiveDate>, created: NaiveDateTime) -> Exam {
        let mut exam = Exam::new_pending(Uuid::new_v4(), file("exame.pdf"), ExamMetadata::default(), created);
        exam.metadata.exam_date = exam_date;
        exam.state = ExamState::Completed(results(
            values.iter().map(|(p, v)| value(p, v)).collect(),
            Vec::new(),
        ));
        exam
    }

    fn with_status(state: ExamState, created: NaiveDateTime) -> Exam {
        let mut exam = Exam::new_pending(Uuid::new_v4(), file("exame.pdf"), ExamMetadata::default(), created);
        exam.state = state;
        exam
    }

    fn altered(parameter: &str, value: f64) -> AlteredValue {
        AlteredValue {
            parameter: parameter.into(),
            value,
            unit: "mg/dl".into(),
            reference: "70 - 99 mg/dL".into(),
            low: Some(70.0),
            high: Some(99.0),
            flag: ValueFlag::High,
            range_source: RangeSource::Table,
        }
    }

    fn query(parameter: Option<&str>, months: u32) -> TrendQuery {
        TrendQuery {
            parameter: parameter.map(String::from),
            months,
        }
    }

    fn filtered_points(report: &TrendReport) -> &[TrendPoint] {
        match &report.view {
            TrendView::Filtered { points, .. } => points,
            TrendView::TopParameters { .. } => panic!("expected filtered view"),
        }
    }

    fn top(report: &TrendReport) -> &[ParameterTrend] {
        match &report.view {
            TrendView::TopParameters { trends } => trends,
            TrendView::Filtered { .. } => panic!("expected top parameters view"),
        }
    }

    // ── Trends ─────────────────────────────────────────────────────────

    #[test]
    fn test_filtered_series_in_date_order() {
        let exams = vec![
            completed(&[("Glicose", "130")], NaiveDate::from_ymd_opt(2024, 3, 1), ts(2024, 6, 1)),
            completed(&[("Glicose", "85")], NaiveDate::from_ymd_opt(2024, 1, 10), ts(2024, 6, 2)),
            completed(&[("Glicose", "95")], NaiveDate::from_ymd_opt(2024, 5, 20), ts(2024, 6, 3)),
        ];

        let report = parameter_trends(&exams, &query(Some("glicose"), 12), now());
        let values: Vec<f64> = filtered_points(&report).iter().map(|p| p.value).collect();
        assert_eq!(values, vec![85.0, 130.0, 95.0]);
        assert_eq!(report.period_months, 12);
        assert_eq!(report.available_parameters, vec!["Glicose"]);
    }

    #[test]
    fn test_filter_is_case_and_accent_insensitive_containment() {
        let exams = vec![completed(
            &[("Triglicerídeos", "180,5"), ("Glicose em jejum", "90")],
            None,
            ts(2024, 6, 1),
        )];

        let report = parameter_trends(&exams, &query(Some("TRIGLICERIDEOS"), 12), now());
        let points = filtered_points(&report);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 180.5);

        let report = parameter_trends(&exams, &query(Some("glicose"), 12), now());
        assert_eq!(filtered_points(&report)[0].parameter, "Glicose em jejum");
    }

    #[test]
    fn test_date_falls_back_to_creation_date() {
        let exams = vec![completed(&[("Glicose", "85")], None, ts(2024, 6, 15))];
        let report = parameter_trends(&exams, &query(Some("glicose"), 12), now());
        assert_eq!(filtered_points(&report)[0].date, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    }

    #[test]
    fn test_window_excludes_old_exams() {
        let exams = vec![
            completed(&[("Glicose", "85")], NaiveDate::from_ymd_opt(2023, 1, 1), ts(2023, 1, 1)),
            completed(&[("Glicose", "95")], NaiveDate::from_ymd_opt(2024, 6, 20), ts(2024, 6, 20)),
        ];
        let report = parameter_trends(&exams, &query(Some("glicose"), 1), now());
        let values: Vec<f64> = filtered_points(&report).iter().map(|p| p.value).collect();
        assert_eq!(values, vec![95.0]);
    }

    #[test]
    fn test_window_uses_upload_date_not_exam_date() {
        let exams = vec![
            completed(&[("Glicose", "85")], NaiveDate::from_ymd_opt(2022, 1, 10), ts(2024, 6, 20)),
            completed(&[("Glicose", "99")], NaiveDate::from_ymd_opt(2024, 6, 1), ts(2022, 3, 1)),
        ];
        let report = parameter_trends(&exams, &query(Some("glicose"), 12), now());
        let points = filtered_points(&report);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 85.0);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2022, 1, 10).unwrap());
        assert_eq!(report.available_parameters, vec!["Glicose"]);
    }

    #[test]
    fn test_only_completed_exams_with_values_count() {
        let exams = vec![
            completed(&[], None, ts(2024, 6, 1)),
            with_status(ExamState::Pending, ts(2024, 6, 2)),
            with_status(ExamState::Error { message: "File not found".into() }, ts(2024, 6, 3)),
            completed(&[("Hemoglobina", "13,5")], None, ts(2024, 6, 4)),
        ];

        let report = parameter_trends(&exams, &TrendQuery::default(), now());
        assert_eq!(report.available_parameters, vec!["Hemoglobina"]);
        let trends = top(&report);
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].parameter, "Hemoglobina");
    }

    #[test]
    fn test_top_five_ranking_with_first_seen_ties() {
        let exams = vec![
            completed(
                &[("A1", "1"), ("B1", "1"), ("C1", "1"), ("D1", "1"), ("E1", "1"), ("F1", "1")],
                None,
                ts(2024, 6, 1),
            ),
            completed(&[("F1", "2"), ("C1", "2")], None, ts(2024, 6, 2)),
        ];

        let report = parameter_trends(&exams, &query(None, 12), now());
        let names: Vec<&str> = top(&report).iter().map(|t| t.parameter.as_str()).collect();
        assert_eq!(names, vec!["C1", "F1", "A1", "B1", "D1"]);
        assert_eq!(top(&report)[0].occurrences, 2);
        assert_eq!(report.available_parameters.len(), 6);
    }

    #[test]
    fn test_duplicate_pairs_in_one_exam_count_once() {
        // Overlapping patterns produce the same value twice.
        let exams = vec![
            completed(&[("Glicose", "85"), ("Glicose", "85"), ("Ureia", "30")], None, ts(2024, 6, 1)),
            completed(&[("Ureia", "32")], None, ts(2024, 6, 2)),
        ];

        let report = parameter_trends(&exams, &query(None, 12), now());
        let trends = top(&report);
        assert_eq!(trends[0].parameter, "Ureia");
        assert_eq!(trends[0].occurrences, 2);
        assert_eq!(trends[1].occurrences, 1);
        assert_eq!(trends[1].points.len(), 1);
    }

    #[test]
    fn test_unparseable_values_are_skipped() {
        let exams = vec![completed(&[("Glicose", "1.234,5"), ("Glicose", "90")], None, ts(2024, 6, 1))];
        let report = parameter_trends(&exams, &query(Some("glicose"), 12), now());
        assert_eq!(filtered_points(&report).len(), 1);
    }

    #[test]
    fn test_blank_filter_means_top_parameters() {
        let exams = vec![completed(&[("Glicose", "90")], None, ts(2024, 6, 1))];
        let report = parameter_trends(&exams, &query(Some("  "), 12), now());
        assert_eq!(top(&report).len(), 1);
    }

    // ── Summary ────────────────────────────────────────────────────────

    #[test]
    fn test_summary_counts_and_alerts() {
        let mut recent = completed(&[("Glicose", "130")], None, ts(2024, 6, 20));
        recent.metadata.exam_type = Some("Bioquímica".into());
        recent.metadata.lab_name = Some("Lab Central".into());
        recent.state = ExamState::Completed(results(
            vec![value("Glicose", "130")],
            vec![altered("Glicose", 130.0)],
        ));

        let exams = vec![
            recent,
            with_status(ExamState::Pending, ts(2024, 6, 25)),
            with_status(ExamState::Error { message: "boom".into() }, ts(2024, 1, 1)),
        ];

        let summary = patient_summary(&exams, now());
        assert_eq!(summary.counts.total, 3);
        assert_eq!(summary.counts.completed, 1);
        assert_eq!(summary.counts.pending, 1);
        assert_eq!(summary.counts.error, 1);
        assert_eq!(summary.counts.recent, 2);
        assert_eq!(summary.counts.completion_rate, 33.3);
        assert_eq!(summary.exam_types, vec!["Bioquímica"]);
        assert_eq!(summary.laboratories, vec!["Lab Central"]);
        assert_eq!(summary.recent_altered_values.len(), 1);
        assert_eq!(summary.last_exam.as_ref().unwrap().created_at, ts(2024, 6, 25));
        assert_eq!(
            summary.alerts,
            SummaryAlerts {
                pending_exams: true,
                error_exams: true,
                no_recent_exams: false,
                altered_values: true,
            }
        );
    }

    #[test]
    fn test_summary_caps_altered_values_and_ignores_old_exams() {
        let many: Vec<AlteredValue> = (0..12).map(|i| altered("Glicose", 100.0 + i as f64)).collect();
        let mut fresh = completed(&[("Glicose", "100")], None, ts(2024, 6, 28));
        fresh.state = ExamState::Completed(results(vec![value("Glicose", "100")], many));

        let mut old = completed(&[("Glicose", "150")], None, ts(2024, 1, 1));
        old.state = ExamState::Completed(results(vec![value("Glicose", "150")], vec![altered("Glicose", 150.0)]));

        let summary = patient_summary(&[old, fresh], now());
        assert_eq!(summary.recent_altered_values.len(), 10);
        assert!(summary.recent_altered_values.iter().all(|a| a.value < 150.0));
    }

    #[test]
    fn test_summary_without_recent_exams_raises_alert() {
        let exams = vec![completed(&[("Glicose", "90")], None, ts(2023, 1, 1))];
        let summary = patient_summary(&exams, now());
        assert!(summary.alerts.no_recent_exams);
        assert!(!summary.alerts.altered_values);
    }

    #[test]
    fn test_empty_patient_summary() {
        let summary = patient_summary(&[], now());
        assert_eq!(summary.counts, ExamCounts::default());
        assert!(summary.last_exam.is_none());
        assert_eq!(summary.alerts, SummaryAlerts::default());
    }

    #[test]
    fn test_completion_rate_rounding() {
        assert_eq!(completion_rate(2, 3), 66.7);
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(completion_rate(4, 4), 100.0);
    }

    // ── Medical record ─────────────────────────────────────────────────

    #[test]
    fn test_medical_record_filters_and_orders() {
        let mut a = completed(&[("Glicose", "90")], NaiveDate::from_ymd_opt(2024, 2, 1), ts(2024, 2, 1));
        a.metadata.exam_type = Some("Bioquímica".into());
        let mut b = completed(&[("Hemoglobina", "14")], NaiveDate::from_ymd_opt(2024, 4, 1), ts(2024, 4, 1));
        b.metadata.exam_type = Some("Hemograma".into());
        let mut c = with_status(ExamState::Pending, ts(2024, 6, 1));
        c.metadata.exam_type = Some("Bioquímica".into());

        let all = medical_record(vec![a.clone(), b.clone(), c.clone()], &MedicalRecordFilter::default(), now());
        let ids: Vec<Uuid> = all.exams.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b.id, a.id, c.id]);
        assert_eq!(all.statistics.total_exams, 3);
        assert_eq!(all.statistics.completed_exams, 2);
        assert_eq!(all.statistics.recent_exams, 1);

        let filter = MedicalRecordFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..Default::default()
        };
        let dated = medical_record(vec![a.clone(), b.clone(), c.clone()], &filter, now());
        assert_eq!(dated.exams.len(), 1);
        assert_eq!(dated.exams[0].id, b.id);

        let filter = MedicalRecordFilter {
            exam_type: Some("bioq".into()),
            ..Default::default()
        };
        let typed = medical_record(vec![a, b, c], &filter, now());
        assert_eq!(typed.exams.len(), 2);
        assert_eq!(typed.statistics.exam_types, vec!["Bioquímica"]);
        assert_eq!(typed.statistics.completion_rate, 50.0);
    }

    // ── Timeline ───────────────────────────────────────────────────────

    #[test]
    fn test_timeline_newest_first_with_status_severity() {
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Ana Costa".into(),
            birth_date: None,
            created_at: ts(2024, 1, 1),
        };
        let exams = vec![
            completed(&[("Glicose", "90")], None, ts(2024, 2, 1)),
            with_status(ExamState::Error { message: "x".into() }, ts(2024, 3, 1)),
            with_status(ExamState::Processing, ts(2024, 4, 1)),
        ];

        let events = patient_timeline(&patient, &exams);
        assert_eq!(events.len(), 4);
        let severities: Vec<EventSeverity> = events.iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![
                EventSeverity::InProgress,
                EventSeverity::Failed,
                EventSeverity::Completed,
                EventSeverity::Info,
            ]
        );
        assert_eq!(events[3].event_type, TimelineEventType::PatientCreated);
        assert!(events[2].has_results);
        assert!(events[0].description.contains("Status: processing"));
    }

    // ── Loaders ────────────────────────────────────────────────────────

    #[test]
    fn test_load_trends_from_database() {
        let conn = crate::db::open_memory_database().unwrap();
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Ana Costa".into(),
            birth_date: None,
            created_at: ts(2024, 1, 1),
        };
        crate::db::insert_patient(&conn, &patient).unwrap();

        for (raw, day) in [("85", 1), ("130", 2), ("95", 3)] {
            let exam = Exam::new_pending(patient.id, file("exame.pdf"), ExamMetadata::default(), ts(2024, 6, day));
            crate::db::insert_exam(&conn, &exam).unwrap();
            assert!(crate::db::claim_for_processing(&conn, &exam.id, &ts(2024, 6, day)).unwrap());
            crate::db::record_completed(
                &conn,
                &exam.id,
                &results(vec![value("Glicose", raw)], Vec::new()),
                &exam.metadata,
                &ts(2024, 6, day),
            )
            .unwrap();
        }

        let report = load_parameter_trends(&conn, &patient.id, &query(Some("glicose"), 12), now()).unwrap();
        let values: Vec<f64> = filtered_points(&report).iter().map(|p| p.value).collect();
        assert_eq!(values, vec![85.0, 130.0, 95.0]);

        let summary = load_patient_summary(&conn, &patient.id, now()).unwrap();
        assert_eq!(summary.counts.completed, 3);

        let timeline = load_patient_timeline(&conn, &patient).unwrap();
        assert_eq!(timeline.len(), 4);
    }
}
