use super::types::{OcrEngine, OcrPageResult};
use super::ExtractionError;

/// Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: std::path::PathBuf,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// `tessdata_dir` must hold the traineddata for `lang` (e.g. `por`).
    pub fn new(tessdata_dir: &std::path::Path, lang: &str) -> Result<Self, ExtractionError> {
        let primary = lang.split('+').next().unwrap_or(lang);
        if !tessdata_dir.join(format!("{primary}.traineddata")).exists() {
            return Err(ExtractionError::TessdataNotFound(tessdata_dir.to_path_buf()));
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
        })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn ocr_image(&self, image_bytes: &[u8], lang: &str) -> Result<OcrPageResult, ExtractionError> {
        let tessdata_str = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(tessdata_str), Some(lang))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        Ok(OcrPageResult { text, confidence })
    }
}

/// Stand-in used when no OCR engine could be set up.
/// The extractor checks `is_available` and emits its placeholder text instead.
pub struct UnavailableOcr;

impl OcrEngine for UnavailableOcr {
    fn ocr_image(&self, _image_bytes: &[u8], _lang: &str) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrInit("No OCR engine installed".into()))
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8], _lang: &str) -> Result<OcrPageResult, ExtractionError> {
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

/// OCR engine that always fails, for error-path tests.
pub struct FailingOcrEngine;

impl OcrEngine for FailingOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8], _lang: &str) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrProcessing("engine crashed".into()))
    }
}
