use std::path::Path;

use super::preprocess::prepare_or_original;
use super::sanitize::sanitize_extracted_text;
use super::types::{ExtractionMethod, OcrEngine, PdfExtractor, RawText, TextExtractor};
use super::ExtractionError;
use crate::config::DEFAULT_OCR_LANGUAGE;
use crate::models::enums::FileKind;

/// Text recorded for images when no OCR engine is installed.
pub const OCR_PLACEHOLDER_TEXT: &str =
    "[Image text not extracted: no OCR engine available on this installation]";

/// Page separator in multi-page PDF output.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Concrete implementation of the text extractor.
/// Uses trait objects for OCR and PDF extraction, enabling dependency injection.
pub struct RawTextExtractor {
    ocr_engine: Box<dyn OcrEngine + Send + Sync>,
    pdf_extractor: Box<dyn PdfExtractor + Send + Sync>,
    ocr_language: String,
}

impl RawTextExtractor {
    pub fn new(
        ocr_engine: Box<dyn OcrEngine + Send + Sync>,
        pdf_extractor: Box<dyn PdfExtractor + Send + Sync>,
    ) -> Self {
        Self {
            ocr_engine,
            pdf_extractor,
            ocr_language: DEFAULT_OCR_LANGUAGE.to_string(),
        }
    }

    /// Tesseract language code(s), e.g. `por` or `por+eng`.
    pub fn with_language(mut self, lang: &str) -> Self {
        self.ocr_language = lang.to_string();
        self
    }

    fn extract_pdf(&self, bytes: &[u8]) -> Result<RawText, ExtractionError> {
        let pages = self.pdf_extractor.extract_pages(bytes)?;
        let page_count = pages.len();
        let text = pages
            .iter()
            .map(|p| sanitize_extracted_text(p))
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR);
        let confidence = if text.trim().is_empty() { 0.0 } else { 0.95 };

        Ok(RawText {
            text,
            method: ExtractionMethod::PdfDirect,
            page_count,
            confidence,
            is_placeholder: false,
        })
    }

    fn extract_image(&self, bytes: &[u8]) -> Result<RawText, ExtractionError> {
        if !self.ocr_engine.is_available() {
            tracing::warn!("OCR engine unavailable, recording placeholder text");
            return Ok(RawText {
                text: OCR_PLACEHOLDER_TEXT.to_string(),
                method: ExtractionMethod::OcrPlaceholder,
                page_count: 1,
                confidence: 0.0,
                is_placeholder: true,
            });
        }

        let prepared = prepare_or_original(bytes);
        let ocr = self.ocr_engine.ocr_image(&prepared, &self.ocr_language)?;

        Ok(RawText {
            text: sanitize_extracted_text(&ocr.text),
            method: ExtractionMethod::TesseractOcr,
            page_count: 1,
            confidence: ocr.confidence,
            is_placeholder: false,
        })
    }
}

impl TextExtractor for RawTextExtractor {
    fn extract(&self, path: &Path, kind: FileKind) -> Result<RawText, ExtractionError> {
        if !path.is_file() {
            return Err(ExtractionError::FileNotFound(path.to_path_buf()));
        }
        tracing::info!(kind = kind.as_str(), "Starting text extraction");

        let bytes = std::fs::read(path)?;
        let result = match kind {
            FileKind::Pdf => self.extract_pdf(&bytes)?,
            FileKind::Image => self.extract_image(&bytes)?,
        };

        tracing::info!(
            method = ?result.method,
            pages = result.page_count,
            confidence = result.confidence,
            text_length = result.text.len(),
            "Text extraction complete"
        );
        Ok(result)
    }
}
