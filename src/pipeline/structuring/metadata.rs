//! Keyword and pattern heuristics for exam metadata.
//!
//! Only used to fill fields the uploader left empty.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::ExamMetadata;
use crate::pipeline::reference::normalize_name;

/// Fallback type when no keyword family matches.
pub const GENERIC_EXAM_TYPE: &str = "Exame Laboratorial";

const MAX_FIELD_CHARS: usize = 120;

/// Keyword families, checked in order. Keywords are accent-folded.
const EXAM_TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    ("Hemograma", &["hemograma", "hemacias", "leucocitos", "plaquetas"]),
    ("Bioquímica", &["glicose", "colesterol", "triglicerides", "ureia"]),
    ("Urina", &["urina", "urocultura", "sedimento"]),
    ("Imagem", &["raio-x", "radiografia", "tomografia", "ressonancia"]),
];

static LAB_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)laborat[óo]rio[ \t]+([^\n]+)",
        r"(?i)\blab\.[ \t]+([^\n]+)",
        r"(?i)centro[ \t]+de[ \t]+an[áa]lises[ \t]+([^\n]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static PHYSICIAN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bdr\.?[ \t]+([^\n]+)",
        r"(?i)\bdra\.?[ \t]+([^\n]+)",
        r"(?i)m[ée]dico[ \t]*:[ \t]*([^\n]+)",
        r"(?i)solicitante[ \t]*:[ \t]*([^\n]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static LABELED_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)data[ \t]*:[ \t]*(\d{1,2})[/-](\d{1,2})[/-](\d{4})").expect("valid regex")
});

static NUMERIC_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{4})\b").expect("valid regex"));

static WRITTEN_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})[ \t]+de[ \t]+(\p{L}+)[ \t]+de[ \t]+(\d{4})\b").expect("valid regex")
});

const MONTHS: &[&str] = &[
    "janeiro", "fevereiro", "marco", "abril", "maio", "junho", "julho", "agosto", "setembro",
    "outubro", "novembro", "dezembro",
];

/// Detect all metadata fields at once.
pub fn detect_metadata(text: &str) -> ExamMetadata {
    if text.trim().is_empty() {
        return ExamMetadata::default();
    }
    ExamMetadata {
        exam_type: Some(detect_exam_type(text).to_string()),
        exam_date: detect_exam_date(text),
        lab_name: first_capture(&LAB_PATTERNS, text),
        requesting_physician: first_capture(&PHYSICIAN_PATTERNS, text),
    }
}

pub fn detect_exam_type(text: &str) -> &'static str {
    let folded = normalize_name(text);
    EXAM_TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| folded.contains(k)))
        .map(|(exam_type, _)| *exam_type)
        .unwrap_or(GENERIC_EXAM_TYPE)
}

/// A labeled `data:` date wins over the first date found anywhere.
pub fn detect_exam_date(text: &str) -> Option<NaiveDate> {
    if let Some(date) = LABELED_DATE.captures(text).and_then(|c| dmy(&c[1], &c[2], &c[3])) {
        return Some(date);
    }
    if let Some(date) = NUMERIC_DATE
        .captures_iter(text)
        .find_map(|c| dmy(&c[1], &c[2], &c[3]))
    {
        return Some(date);
    }
    WRITTEN_DATE.captures_iter(text).find_map(|c| {
        let month_name = normalize_name(&c[2]);
        let month = MONTHS.iter().position(|m| *m == month_name)? + 1;
        dmy(&c[1], &month.to_string(), &c[3])
    })
}

/// Parse a date string returned by the analysis service.
pub fn parse_exam_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| detect_exam_date(raw))
}

fn dmy(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|p| {
        let captured = p.captures(text)?.get(1)?.as_str().trim();
        if captured.is_empty() {
            return None;
        }
        Some(captured.chars().take(MAX_FIELD_CHARS).collect())
    })
}
