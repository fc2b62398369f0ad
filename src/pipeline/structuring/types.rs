use serde::{Deserialize, Serialize};

use super::StructuringError;
use crate::models::enums::ExtractionSource;
use crate::models::{ExamMetadata, ExtractedValue};

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionParams {
    /// Exam-level analysis.
    pub const ANALYSIS: Self = Self {
        temperature: 0.1,
        max_tokens: 2000,
    };

    /// Values-only extraction.
    pub const VALUES: Self = Self {
        temperature: 0.0,
        max_tokens: 1500,
    };

    pub const CONNECTION_TEST: Self = Self {
        temperature: 0.0,
        max_tokens: 10,
    };
}

/// Chat-completion client abstraction (allows mocking)
pub trait LlmClient {
    fn complete(
        &self,
        system: &str,
        user: &str,
        params: CompletionParams,
    ) -> Result<String, StructuringError>;

    /// Send a trivial prompt and report whether the service answered.
    fn check_connection(&self) -> Result<(), StructuringError> {
        self.complete(
            "",
            "Connection test. Reply only 'OK'.",
            CompletionParams::CONNECTION_TEST,
        )
        .map(|_| ())
    }
}

/// Text → ordered measurements. Implemented by the pattern matcher and the
/// external service adapter.
pub trait ValueExtractor {
    fn extract_values(&self, text: &str) -> Result<Vec<ExtractedValue>, StructuringError>;

    fn source(&self) -> ExtractionSource;
}

/// Exam-level analysis returned by the external service.
/// Only `summary` is required; everything else is best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamAnalysis {
    #[serde(default, alias = "tipo_exame")]
    pub exam_type: Option<String>,
    #[serde(default, alias = "data_exame")]
    pub exam_date: Option<String>,
    #[serde(default, alias = "laboratorio")]
    pub lab_name: Option<String>,
    #[serde(default, alias = "medico_solicitante")]
    pub requesting_physician: Option<String>,
    #[serde(alias = "resumo_clinico")]
    pub summary: String,
    #[serde(default, alias = "interpretacao_sugerida")]
    pub interpretation: Option<String>,
    #[serde(default, alias = "observacoes")]
    pub notes: Option<String>,
    #[serde(default, alias = "valores_alterados")]
    pub altered_values: Vec<serde_json::Value>,
}

/// Output of structuring one exam's text.
#[derive(Debug, Clone)]
pub struct StructuredExam {
    pub values: Vec<ExtractedValue>,
    pub source: ExtractionSource,
    pub summary: String,
    /// Metadata detected from the text or the analysis; callers merge it
    /// under what the uploader supplied.
    pub detected: ExamMetadata,
    pub analysis: Option<serde_json::Value>,
}
