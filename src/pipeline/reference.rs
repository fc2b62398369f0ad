//! Reference-range evaluation of extracted values.
//!
//! Ranges printed next to a value in the document are used first; otherwise
//! the parameter name is looked up in a small configurable table.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::{RangeSource, ValueFlag};
use crate::models::{parse_decimal, AlteredValue, ExtractedValue};

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Failed to read reference table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid reference table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reference entry '{0}' has neither a low nor a high bound")]
    EmptyRange(String),
}

/// One table entry. `key` is matched as a substring of the normalized
/// parameter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub key: String,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub unit: String,
}

impl ReferenceRange {
    fn new(key: &str, low: Option<f64>, high: Option<f64>, unit: &str) -> Self {
        Self {
            key: normalize_name(key),
            low,
            high,
            unit: unit.to_string(),
        }
    }

    fn bounds(&self) -> Bounds {
        Bounds {
            low: self.low,
            high: self.high,
        }
    }
}

/// Parsed limits of a range; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl Bounds {
    pub fn classify(&self, value: f64) -> ValueFlag {
        match (self.low, self.high) {
            (Some(low), _) if value < low => ValueFlag::Low,
            (_, Some(high)) if value > high => ValueFlag::High,
            _ => ValueFlag::Normal,
        }
    }

    fn describe(&self, unit: &str) -> String {
        let text = match (self.low, self.high) {
            (Some(low), Some(high)) => format!("{low} - {high}"),
            (None, Some(high)) => format!("≤ {high}"),
            (Some(low), None) => format!("≥ {low}"),
            (None, None) => String::new(),
        };
        if unit.is_empty() {
            text
        } else {
            format!("{text} {unit}")
        }
    }
}

/// Outcome of evaluating one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// No numeric form, or no known range.
    Unclassified,
    Classified {
        flag: ValueFlag,
        bounds: Bounds,
        source: RangeSource,
    },
}

/// Ranges keyed by parameter-name substring; first match wins.
#[derive(Debug, Clone)]
pub struct ReferenceTable {
    ranges: Vec<ReferenceRange>,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self::seed()
    }
}

impl ReferenceTable {
    /// Built-in ranges for the most common biochemistry and blood count values.
    pub fn seed() -> Self {
        Self::new(vec![
            ReferenceRange::new("glicose", Some(70.0), Some(99.0), "mg/dL"),
            ReferenceRange::new("glucose", Some(70.0), Some(99.0), "mg/dL"),
            ReferenceRange::new("colesterol", None, Some(200.0), "mg/dL"),
            ReferenceRange::new("cholesterol", None, Some(200.0), "mg/dL"),
            ReferenceRange::new("triglic", None, Some(150.0), "mg/dL"),
            ReferenceRange::new("triglyc", None, Some(150.0), "mg/dL"),
            ReferenceRange::new("hemoglobin", Some(12.0), Some(16.0), "g/dL"),
            ReferenceRange::new("hematocrit", Some(36.0), Some(48.0), "%"),
        ])
    }

    pub fn new(ranges: Vec<ReferenceRange>) -> Self {
        let ranges = ranges
            .into_iter()
            .map(|r| ReferenceRange {
                key: normalize_name(&r.key),
                ..r
            })
            .collect();
        Self { ranges }
    }

    /// Load `[{"key", "low", "high", "unit"}]` from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ReferenceError> {
        let content = std::fs::read_to_string(path)?;
        let ranges: Vec<ReferenceRange> = serde_json::from_str(&content)?;
        if let Some(empty) = ranges.iter().find(|r| r.low.is_none() && r.high.is_none()) {
            return Err(ReferenceError::EmptyRange(empty.key.clone()));
        }
        tracing::info!(entries = ranges.len(), path = %path.display(), "Reference table loaded");
        Ok(Self::new(ranges))
    }

    pub fn ranges(&self) -> &[ReferenceRange] {
        &self.ranges
    }

    pub fn lookup(&self, parameter: &str) -> Option<&ReferenceRange> {
        let name = normalize_name(parameter);
        if name.is_empty() {
            return None;
        }
        self.ranges.iter().find(|r| name.contains(&r.key))
    }

    pub fn evaluate(&self, value: &ExtractedValue) -> Evaluation {
        let Some(numeric) = value.numeric else {
            return Evaluation::Unclassified;
        };
        let (bounds, source) = match parse_reference_text(&value.reference) {
            Some(bounds) => (bounds, RangeSource::Document),
            None => match self.lookup(&value.parameter) {
                Some(range) => (range.bounds(), RangeSource::Table),
                None => return Evaluation::Unclassified,
            },
        };
        Evaluation::Classified {
            flag: bounds.classify(numeric),
            bounds,
            source,
        }
    }

    /// Values outside their range, once per (parameter, value) pair.
    pub fn altered_values(&self, values: &[ExtractedValue]) -> Vec<AlteredValue> {
        let mut seen: Vec<(String, u64)> = Vec::new();
        let mut altered = Vec::new();

        for value in values {
            let Evaluation::Classified { flag, bounds, source } = self.evaluate(value) else {
                continue;
            };
            if flag == ValueFlag::Normal {
                continue;
            }
            let Some(numeric) = value.numeric else {
                continue;
            };
            let key = (normalize_name(&value.parameter), numeric.to_bits());
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            let table_unit = self
                .lookup(&value.parameter)
                .map(|r| r.unit.as_str())
                .unwrap_or("");
            let unit = if value.unit.is_empty() { table_unit } else { value.unit.as_str() };
            let reference = match source {
                RangeSource::Document => value.reference.clone(),
                RangeSource::Table => bounds.describe(table_unit),
            };

            altered.push(AlteredValue {
                parameter: value.parameter.clone(),
                value: numeric,
                unit: unit.to_string(),
                reference,
                low: bounds.low,
                high: bounds.high,
                flag,
                range_source: source,
            });
        }
        altered
    }
}

// ─── Reference text parsing ──────────────────────────────

const NUMBER: &str = r"(\d+(?:[.,]\d+)?)";

static RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{NUMBER}\s*(?:-|–|a|to|ate)\s*{NUMBER}")).expect("valid regex")
});

static UPPER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:<=|≤|<|ate|inferior a|menor que|abaixo de|up to|below)\s*{NUMBER}"
    ))
    .expect("valid regex")
});

static LOWER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:>=|≥|>|superior a|maior que|acima de|above)\s*{NUMBER}"
    ))
    .expect("valid regex")
});

/// Parse a reference printed in the document (`70 a 99`, `< 200`,
/// `superior a 40`, ...). `None` when no bound can be read.
pub fn parse_reference_text(text: &str) -> Option<Bounds> {
    let text = normalize_name(text);
    if text.is_empty() {
        return None;
    }
    if let Some(caps) = RANGE_PATTERN.captures(&text) {
        let low = parse_decimal(&caps[1])?;
        let high = parse_decimal(&caps[2])?;
        if low <= high {
            return Some(Bounds {
                low: Some(low),
                high: Some(high),
            });
        }
    }
    if let Some(caps) = UPPER_PATTERN.captures(&text) {
        return Some(Bounds {
            low: None,
            high: Some(parse_decimal(&caps[1])?),
        });
    }
    if let Some(caps) = LOWER_PATTERN.captures(&text) {
        return Some(Bounds {
            low: Some(parse_decimal(&caps[1])?),
            high: None,
        });
    }
    None
}

/// Lowercase, strip Portuguese/Latin accents and collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(fold_accent)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(parameter: &str, raw: &str, reference: &str) -> ExtractedValue {
        ExtractedValue::new(parameter, raw, "mg/dl", reference, "")
    }

    fn flag_of(eval: Evaluation) -> Option<ValueFlag> {
        match eval {
            Evaluation::Classified { flag, .. } => Some(flag),
            Evaluation::Unclassified => None,
        }
    }

    #[test]
    fn glucose_normal_and_high_from_table() {
        let table = ReferenceTable::seed();
        assert_eq!(flag_of(table.evaluate(&value("Glicose", "85", ""))), Some(ValueFlag::Normal));
        assert_eq!(flag_of(table.evaluate(&value("Glicose", "130", ""))), Some(ValueFlag::High));
        assert_eq!(flag_of(table.evaluate(&value("Glicose", "65", ""))), Some(ValueFlag::Low));
    }

    #[test]
    fn bounds_are_inclusive() {
        let table = ReferenceTable::seed();
        assert_eq!(flag_of(table.evaluate(&value("Glicose", "70", ""))), Some(ValueFlag::Normal));
        assert_eq!(flag_of(table.evaluate(&value("Glicose", "99", ""))), Some(ValueFlag::Normal));
    }

    #[test]
    fn lookup_is_accent_and_case_insensitive() {
        let table = ReferenceTable::seed();
        assert_eq!(table.lookup("TRIGLICERÍDEOS").unwrap().high, Some(150.0));
        assert_eq!(table.lookup("Hematócrito").unwrap().low, Some(36.0));
        assert_eq!(table.lookup("Hemoglobina").unwrap().high, Some(16.0));
        assert!(table.lookup("TSH").is_none());
    }

    #[test]
    fn unknown_parameter_is_unclassified() {
        let table = ReferenceTable::seed();
        assert_eq!(table.evaluate(&value("TSH", "2,1", "")), Evaluation::Unclassified);
    }

    #[test]
    fn non_numeric_value_is_unclassified() {
        let table = ReferenceTable::seed();
        assert_eq!(table.evaluate(&value("Glicose", "1.234,5", "")), Evaluation::Unclassified);
    }

    #[test]
    fn document_reference_wins_over_table() {
        let table = ReferenceTable::seed();
        let eval = table.evaluate(&value("Glicose", "105", "70 a 110"));
        assert_eq!(
            eval,
            Evaluation::Classified {
                flag: ValueFlag::Normal,
                bounds: Bounds { low: Some(70.0), high: Some(110.0) },
                source: RangeSource::Document,
            }
        );
    }

    #[test]
    fn document_reference_without_table_entry() {
        let table = ReferenceTable::seed();
        assert_eq!(
            flag_of(table.evaluate(&value("HDL", "35", "superior a 40"))),
            Some(ValueFlag::Low)
        );
    }

    #[test]
    fn reference_text_forms() {
        let both = |l, h| Some(Bounds { low: Some(l), high: Some(h) });
        assert_eq!(parse_reference_text("70 a 99"), both(70.0, 99.0));
        assert_eq!(parse_reference_text("70 - 99 mg/dl"), both(70.0, 99.0));
        assert_eq!(parse_reference_text("12,0 – 16,0"), both(12.0, 16.0));
        assert_eq!(parse_reference_text("3.5 to 5.0"), both(3.5, 5.0));
        assert_eq!(
            parse_reference_text("Desejável: < 200"),
            Some(Bounds { low: None, high: Some(200.0) })
        );
        assert_eq!(
            parse_reference_text("até 150"),
            Some(Bounds { low: None, high: Some(150.0) })
        );
        assert_eq!(
            parse_reference_text("Inferior a 150"),
            Some(Bounds { low: None, high: Some(150.0) })
        );
        assert_eq!(
            parse_reference_text("≥ 40"),
            Some(Bounds { low: Some(40.0), high: None })
        );
        assert_eq!(parse_reference_text("ver laudo"), None);
        assert_eq!(parse_reference_text(""), None);
    }

    #[test]
    fn altered_values_are_deduplicated() {
        let table = ReferenceTable::seed();
        let values = vec![
            value("Glicose", "130", ""),
            value("Glicose", "130", ""),
            value("Colesterol Total", "180", ""),
            value("Triglicerídeos", "180,5", ""),
        ];
        let altered = table.altered_values(&values);
        assert_eq!(altered.len(), 2);
        assert_eq!(altered[0].parameter, "Glicose");
        assert_eq!(altered[0].flag, ValueFlag::High);
        assert_eq!(altered[0].range_source, RangeSource::Table);
        assert_eq!(altered[0].reference, "70 - 99 mg/dL");
        assert_eq!(altered[1].value, 180.5);
        assert_eq!(altered[1].reference, "≤ 150 mg/dL");
    }

    #[test]
    fn table_loads_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");
        std::fs::write(
            &path,
            r#"[{"key": "Ureia", "low": 15, "high": 45, "unit": "mg/dL"}, {"key": "TSH", "low": 0.4, "high": 4.0}]"#,
        )
        .unwrap();

        let table = ReferenceTable::from_json_file(&path).unwrap();
        assert_eq!(table.ranges().len(), 2);
        assert_eq!(flag_of(table.evaluate(&value("Uréia", "50", ""))), Some(ValueFlag::High));
        assert!(table.lookup("Glicose").is_none());
    }

    #[test]
    fn table_entry_without_bounds_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");
        std::fs::write(&path, r#"[{"key": "x"}]"#).unwrap();
        assert!(matches!(
            ReferenceTable::from_json_file(&path),
            Err(ReferenceError::EmptyRange(_))
        ));
    }

    #[test]
    fn normalize_folds_accents_and_spaces() {
        assert_eq!(normalize_name("  Hemácias   Totais "), "hemacias totais");
        assert_eq!(normalize_name("AÇÚCAR"), "acucar");
    }
}
