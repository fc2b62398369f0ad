use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::models::enums::FileKind;

/// Text produced from one stored exam file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawText {
    pub text: String,
    pub method: ExtractionMethod,
    pub page_count: usize,
    pub confidence: f32,
    /// Set when no OCR engine was available and `text` is a fixed label.
    pub is_placeholder: bool,
}

/// How text was extracted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExtractionMethod {
    PdfDirect,
    TesseractOcr,
    OcrPlaceholder,
}

/// Raw OCR result from the engine
#[derive(Debug)]
pub struct OcrPageResult {
    pub text: String,
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine {
    fn ocr_image(&self, image_bytes: &[u8], lang: &str) -> Result<OcrPageResult, ExtractionError>;

    /// False for the stand-in used when no engine is installed.
    fn is_available(&self) -> bool {
        true
    }
}

/// PDF text extraction abstraction. One string per page.
pub trait PdfExtractor {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

/// File → text contract used by the processor.
pub trait TextExtractor {
    fn extract(&self, path: &Path, kind: FileKind) -> Result<RawText, ExtractionError>;

    /// Same as `extract`, for callers holding a textual kind tag.
    fn extract_tagged(&self, path: &Path, tag: &str) -> Result<RawText, ExtractionError> {
        let kind = tag
            .parse::<FileKind>()
            .map_err(|_| ExtractionError::UnsupportedFileKind(tag.to_string()))?;
        self.extract(path, kind)
    }
}
