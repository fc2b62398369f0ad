//! Pattern-based value extraction. Always available, no external calls.

use std::sync::LazyLock;

use regex::Regex;

use super::types::ValueExtractor;
use super::StructuringError;
use crate::models::enums::ExtractionSource;
use crate::models::ExtractedValue;

/// `Name: Number Unit (Reference)`
static NAME_COLON_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)([A-Za-zÀ-ÿ \t]+):[ \t]*([0-9,.]+)[ \t]*([a-zA-Z/%µ]*)[ \t]*(?:\(([^)\n]+)\))?")
        .expect("valid regex")
});

/// `Name Number Unit`
static NAME_VALUE_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)([A-Za-zÀ-ÿ \t]+)[ \t]+([0-9,.]+)[ \t]+([a-zA-Z/%µ]+)").expect("valid regex")
});

/// `Name [:-] Number Unit` with a name of at least three characters.
static LOOSE_NAME_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)([A-Za-zÀ-ÿ \t]{3,})[ \t]*[:\-][ \t]*([0-9,.]+)[ \t]*([a-zA-Z/%µ]*)")
        .expect("valid regex")
});

const MIN_NAME_CHARS: usize = 3;

/// Applies the three line patterns in order over the whole text.
/// A line matched by several patterns yields several values.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn extract(&self, text: &str) -> Vec<ExtractedValue> {
        let mut values = Vec::new();
        for pattern in [&*NAME_COLON_VALUE, &*NAME_VALUE_UNIT, &*LOOSE_NAME_VALUE] {
            for caps in pattern.captures_iter(text) {
                let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
                let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
                if name.chars().count() < MIN_NAME_CHARS || value.is_empty() {
                    continue;
                }
                let unit = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                let reference = caps.get(4).map(|m| m.as_str()).unwrap_or("");
                let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                values.push(ExtractedValue::new(
                    name,
                    value,
                    unit,
                    reference,
                    line_containing(text, start),
                ));
            }
        }
        values
    }
}

impl ValueExtractor for PatternExtractor {
    fn extract_values(&self, text: &str) -> Result<Vec<ExtractedValue>, StructuringError> {
        Ok(self.extract(text))
    }

    fn source(&self) -> ExtractionSource {
        ExtractionSource::Pattern
    }
}

fn line_containing(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(text.len());
    &text[start..end]
}
