use super::metadata::{detect_metadata, parse_exam_date};
use super::parser::{parse_analysis_response, parse_values_response};
use super::patterns::PatternExtractor;
use super::prompt::{
    build_analysis_prompt, build_values_prompt, ANALYSIS_SYSTEM_PROMPT, VALUES_SYSTEM_PROMPT,
};
use super::types::{
    CompletionParams, ExamAnalysis, LlmClient, StructuredExam, ValueExtractor,
};
use super::StructuringError;
use crate::models::enums::ExtractionSource;
use crate::models::{ExamMetadata, ExtractedValue};

pub const SUMMARY_FEW_PARAMETERS: &str = "Exam with few analyzed parameters.";
pub const SUMMARY_MULTIPLE_PARAMETERS: &str = "Exam with multiple laboratory parameters.";
pub const SUMMARY_DETAILED: &str = "Detailed exam covering multiple parameters.";

/// Values extraction through the external service.
pub struct ExternalValueExtractor<'a> {
    llm: &'a dyn LlmClient,
}

impl<'a> ExternalValueExtractor<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self { llm }
    }
}

impl ValueExtractor for ExternalValueExtractor<'_> {
    fn extract_values(&self, text: &str) -> Result<Vec<ExtractedValue>, StructuringError> {
        if text.trim().is_empty() {
            return Err(StructuringError::EmptyInput);
        }
        let response = self.llm.complete(
            VALUES_SYSTEM_PROMPT,
            &build_values_prompt(text),
            CompletionParams::VALUES,
        )?;
        parse_values_response(&response)
    }

    fn source(&self) -> ExtractionSource {
        ExtractionSource::External
    }
}

/// Turns extracted text into values, summary and detected metadata.
///
/// With an LLM client the external path is tried first; every external
/// failure is logged and absorbed, and the pattern matcher takes over.
pub struct ExamStructurer {
    llm: Option<Box<dyn LlmClient + Send + Sync>>,
    patterns: PatternExtractor,
}

impl ExamStructurer {
    pub fn new(llm: Option<Box<dyn LlmClient + Send + Sync>>) -> Self {
        Self {
            llm,
            patterns: PatternExtractor,
        }
    }

    /// Pattern matching only.
    pub fn offline() -> Self {
        Self::new(None)
    }

    pub fn has_external(&self) -> bool {
        self.llm.is_some()
    }

    /// Structure one exam's text. Never fails: external problems degrade to
    /// the pattern path and the length-band summary.
    pub fn structure(&self, text: &str, is_placeholder: bool) -> StructuredExam {
        let _span = tracing::info_span!("structure_exam", text_length = text.len()).entered();

        let external: Option<&dyn LlmClient> = match &self.llm {
            Some(llm) if !is_placeholder && !text.trim().is_empty() => Some(llm.as_ref()),
            _ => None,
        };

        let analysis = external.and_then(|llm| self.analyze(llm, text));
        let (values, source) = self.extract_values(external, text);

        let mut detected = ExamMetadata::default();
        if let Some((analysis, _)) = &analysis {
            detected = metadata_from_analysis(analysis);
        }
        if !is_placeholder {
            detected.fill_missing(detect_metadata(text));
        }

        let summary = analysis
            .as_ref()
            .map(|(a, _)| a.summary.trim().to_string())
            .unwrap_or_else(|| summary_for_length(text.chars().count()).to_string());

        tracing::info!(
            values = values.len(),
            source = source.as_str(),
            analyzed = analysis.is_some(),
            "Structuring complete"
        );

        StructuredExam {
            values,
            source,
            summary,
            detected,
            analysis: analysis.map(|(_, raw)| raw),
        }
    }

    fn analyze(&self, llm: &dyn LlmClient, text: &str) -> Option<(ExamAnalysis, serde_json::Value)> {
        let result = llm
            .complete(
                ANALYSIS_SYSTEM_PROMPT,
                &build_analysis_prompt(text),
                CompletionParams::ANALYSIS,
            )
            .and_then(|response| parse_analysis_response(&response));
        match result {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(error = %e, "Exam analysis failed, using length-based summary");
                None
            }
        }
    }

    fn extract_values(
        &self,
        external: Option<&dyn LlmClient>,
        text: &str,
    ) -> (Vec<ExtractedValue>, ExtractionSource) {
        if let Some(llm) = external {
            let extractor = ExternalValueExtractor::new(llm);
            match extractor.extract_values(text) {
                Ok(values) => return (values, extractor.source()),
                Err(e) => {
                    tracing::warn!(error = %e, "External value extraction failed, falling back to patterns");
                }
            }
        }
        (self.patterns.extract(text), self.patterns.source())
    }
}

/// Narrative summary used when no external analysis is available.
pub fn summary_for_length(chars: usize) -> &'static str {
    if chars < 200 {
        SUMMARY_FEW_PARAMETERS
    } else if chars < 500 {
        SUMMARY_MULTIPLE_PARAMETERS
    } else {
        SUMMARY_DETAILED
    }
}

fn metadata_from_analysis(analysis: &ExamAnalysis) -> ExamMetadata {
    fn clean(field: &Option<String>) -> Option<String> {
        field
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
            .map(str::to_string)
    }
    ExamMetadata {
        exam_type: clean(&analysis.exam_type),
        exam_date: analysis.exam_date.as_deref().and_then(parse_exam_date),
        lab_name: clean(&analysis.lab_name),
        requesting_physician: clean(&analysis.requesting_physician),
    }
}
