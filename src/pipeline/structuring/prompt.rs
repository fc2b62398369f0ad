pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"
You are an assistant specialized in reading laboratory and imaging exam reports.
Your task is to extract structured information from the report and give a clear,
objective overview of it.

For each report:
1. Identify the exam type.
2. Extract every numeric value with its unit and reference range.
3. Identify values outside their reference range.
4. Write an objective summary of the main findings.
5. Suggest possible clinical interpretations without giving a diagnosis.

Answer in the language of the report. Output MUST be a single valid JSON object.
"#;

pub const VALUES_SYSTEM_PROMPT: &str = r#"
You extract measurements from laboratory reports.
Extract ONLY parameters literally present in the text, with their units and
reference ranges when shown. NEVER invent, infer or complete values.
Output MUST be a single valid JSON object and nothing else.
"#;

/// Build the exam-level analysis prompt.
pub fn build_analysis_prompt(raw_text: &str) -> String {
    format!(
        r#"Analyze the following exam report and extract its structured information.

<document>
{raw_text}
</document>

Return JSON with this structure (use null for anything not in the report):
{{
  "exam_type": "exam type",
  "exam_date": "YYYY-MM-DD or null",
  "lab_name": "laboratory name or null",
  "requesting_physician": "physician name or null",
  "values": [
    {{"parameter": "name", "value": "value", "unit": "unit", "reference": "reference range", "status": "normal | altered | critical"}}
  ],
  "altered_values": [
    {{"parameter": "name", "value": "value", "reference": "reference range", "alteration": "high | low | critical"}}
  ],
  "summary": "objective summary of the main findings",
  "interpretation": "possible clinical interpretations",
  "notes": "other relevant remarks"
}}"#
    )
}

/// Build the values-only extraction prompt.
pub fn build_values_prompt(raw_text: &str) -> String {
    format!(
        r#"Extract every numeric result from this laboratory report.

<document>
{raw_text}
</document>

Return JSON with this structure:
{{
  "values": [
    {{
      "parameter": "parameter name exactly as written",
      "value": "numeric value as written",
      "unit": "unit or empty string",
      "reference": "reference range as written or empty string",
      "source_line": "full line where the value was found"
    }}
  ]
}}"#
    )
}
