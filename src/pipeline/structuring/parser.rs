use serde::Deserialize;

use super::types::ExamAnalysis;
use super::StructuringError;
use crate::models::ExtractedValue;

/// Locate the JSON object in a model reply.
/// Tolerates Markdown fences and chatter before or after the object.
pub fn extract_json_object(response: &str) -> Result<&str, StructuringError> {
    let body = strip_code_fence(response);
    let start = body
        .find('{')
        .ok_or_else(|| StructuringError::MalformedResponse("No JSON object found".into()))?;
    let end = body
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| StructuringError::MalformedResponse("Unclosed JSON object".into()))?;
    Ok(&body[start..=end])
}

fn strip_code_fence(response: &str) -> &str {
    let Some(open) = response.find("```") else {
        return response;
    };
    let after_open = &response[open + 3..];
    // Skip an optional language tag on the fence line.
    let content_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after_open[content_start..];
    match content.find("```") {
        Some(close) => &content[..close],
        None => content,
    }
}

/// Parse a values-only reply into ordered measurements.
pub fn parse_values_response(response: &str) -> Result<Vec<ExtractedValue>, StructuringError> {
    #[derive(Deserialize)]
    struct RawValuesResponse {
        #[serde(alias = "valores")]
        values: Option<Vec<serde_json::Value>>,
    }

    let json_str = extract_json_object(response)?;
    let raw: RawValuesResponse = serde_json::from_str(json_str)
        .map_err(|e| StructuringError::JsonParsing(e.to_string()))?;
    let items = raw
        .values
        .ok_or_else(|| StructuringError::MalformedResponse("Missing \"values\" array".into()))?;

    let parsed: Vec<RawValue> = parse_array_lenient(Some(&items));
    let values: Vec<ExtractedValue> = parsed.into_iter().filter_map(RawValue::into_value).collect();

    if values.is_empty() && !items.is_empty() {
        return Err(StructuringError::MalformedResponse(format!(
            "None of the {} returned values match the schema",
            items.len()
        )));
    }
    Ok(values)
}

/// Parse an exam-level analysis reply. Returns the typed view and the raw JSON.
pub fn parse_analysis_response(
    response: &str,
) -> Result<(ExamAnalysis, serde_json::Value), StructuringError> {
    let json_str = extract_json_object(response)?;
    let raw: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| StructuringError::JsonParsing(e.to_string()))?;
    let analysis: ExamAnalysis = serde_json::from_value(raw.clone())
        .map_err(|e| StructuringError::MalformedResponse(e.to_string()))?;
    if analysis.summary.trim().is_empty() {
        return Err(StructuringError::MalformedResponse("Empty summary".into()));
    }
    Ok((analysis, raw))
}

#[derive(Deserialize)]
struct RawValue {
    #[serde(alias = "parametro", alias = "nome")]
    parameter: String,
    #[serde(alias = "valor")]
    value: serde_json::Value,
    #[serde(default, alias = "unidade")]
    unit: Option<String>,
    #[serde(default, alias = "referencia")]
    reference: Option<String>,
    #[serde(default, alias = "linha_original")]
    source_line: Option<String>,
}

impl RawValue {
    fn into_value(self) -> Option<ExtractedValue> {
        let value = match self.value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if self.parameter.trim().is_empty() || value.trim().is_empty() {
            return None;
        }
        Some(ExtractedValue::new(
            &self.parameter,
            &value,
            self.unit.as_deref().unwrap_or(""),
            self.reference.as_deref().unwrap_or(""),
            self.source_line.as_deref().unwrap_or(""),
        ))
    }
}

/// Parse an array leniently, skipping items that fail to deserialize.
fn parse_array_lenient<T: for<'de> Deserialize<'de>>(
    items: Option<&[serde_json::Value]>,
) -> Vec<T> {
    match items {
        None => vec![],
        Some(arr) => arr
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
    }
}
