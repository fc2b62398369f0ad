pub mod types;
pub mod sanitize;
pub mod preprocess;
pub mod pdf;
pub mod ocr;
pub mod orchestrator;

pub use types::*;
pub use sanitize::*;
pub use preprocess::*;
pub use pdf::*;
pub use ocr::*;
pub use orchestrator::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported file kind: {0}")]
    UnsupportedFileKind(String),

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Tessdata not found at: {}", .0.display())]
    TessdataNotFound(PathBuf),
}
