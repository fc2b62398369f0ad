use std::panic::{self, AssertUnwindSafe};

use super::types::PdfExtractor;
use super::ExtractionError;

/// PDF text extractor using the pdf-extract crate.
/// Handles digital PDFs with embedded text layers.
pub struct PdfTextExtractor;

impl PdfExtractor for PdfTextExtractor {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        // pdf-extract panics on some malformed fonts and xref tables.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        }));

        match outcome {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(ExtractionError::PdfParsing(e.to_string())),
            Err(payload) => Err(ExtractionError::PdfParsing(format!(
                "PDF engine aborted: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Scripted PDF extractor for tests and callers without a real engine.
pub struct MockPdfExtractor {
    pages: Result<Vec<String>, String>,
}

impl MockPdfExtractor {
    pub fn with_pages(pages: &[&str]) -> Self {
        Self {
            pages: Ok(pages.iter().map(|p| p.to_string()).collect()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            pages: Err(reason.to_string()),
        }
    }
}

impl PdfExtractor for MockPdfExtractor {
    fn extract_pages(&self, _pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        self.pages.clone().map_err(ExtractionError::PdfParsing)
    }
}
