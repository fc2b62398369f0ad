//! Image preparation ahead of OCR.
//!
//! Phone photos of lab reports are often small and colored; Tesseract reads
//! grayscale text at roughly 300 DPI best, so images are converted and
//! upscaled until the short side reaches `OCR_MIN_SHORT_SIDE`, never past
//! `MAX_QUALITY_SIDE` on either side.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use serde::Serialize;

use super::ExtractionError;

/// Short side, in pixels, an image is upscaled to before OCR.
pub const OCR_MIN_SHORT_SIDE: u32 = 1000;

const MIN_QUALITY_SIDE: u32 = 300;
const MAX_QUALITY_SIDE: u32 = 4000;

/// Resolution problems that tend to degrade OCR output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QualityIssue {
    TooSmall { width: u32, height: u32 },
    TooLarge { width: u32, height: u32 },
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooSmall { width, height } => write!(
                f,
                "Low resolution ({width}x{height}); minimum recommended is {MIN_QUALITY_SIDE}x{MIN_QUALITY_SIDE}"
            ),
            Self::TooLarge { width, height } => write!(
                f,
                "Very high resolution ({width}x{height}); processing may be slow"
            ),
        }
    }
}

/// Resolution checks for an image of the given size.
pub fn assess_quality(width: u32, height: u32) -> Vec<QualityIssue> {
    let mut issues = Vec::new();
    if width < MIN_QUALITY_SIDE || height < MIN_QUALITY_SIDE {
        issues.push(QualityIssue::TooSmall { width, height });
    }
    if width > MAX_QUALITY_SIDE || height > MAX_QUALITY_SIDE {
        issues.push(QualityIssue::TooLarge { width, height });
    }
    issues
}

/// Target size after upscaling; images already large enough keep their size.
///
/// The scale is capped so neither side exceeds `MAX_QUALITY_SIDE`; very thin
/// images are upscaled less than `OCR_MIN_SHORT_SIDE` asks for, or not at all.
pub fn upscaled_dimensions(width: u32, height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let short = width.min(height);
    let long = width.max(height);
    if short >= OCR_MIN_SHORT_SIDE {
        return (width, height);
    }
    let scale = (OCR_MIN_SHORT_SIDE as f32 / short as f32).min(MAX_QUALITY_SIDE as f32 / long as f32);
    if scale <= 1.0 {
        return (width, height);
    }
    (
        ((width as f32 * scale).round() as u32).clamp(1, MAX_QUALITY_SIDE),
        ((height as f32 * scale).round() as u32).clamp(1, MAX_QUALITY_SIDE),
    )
}

/// Grayscale + upscale, re-encoded as PNG.
pub fn prepare_for_ocr(image_bytes: &[u8]) -> Result<Vec<u8>, ExtractionError> {
    let img = image::load_from_memory(image_bytes)
        .map_err(|e| ExtractionError::ImageProcessing(format!("Decode failed: {e}")))?;

    let (width, height) = img.dimensions();
    for issue in assess_quality(width, height) {
        tracing::warn!(issue = %issue, "Image quality issue");
    }

    let mut gray = img.grayscale();

    // Oversized inputs are shrunk first so later work stays bounded.
    if width > MAX_QUALITY_SIDE || height > MAX_QUALITY_SIDE {
        gray = gray.resize(MAX_QUALITY_SIDE, MAX_QUALITY_SIDE, FilterType::Triangle);
        tracing::debug!(
            from = format!("{width}x{height}"),
            to = format!("{}x{}", gray.width(), gray.height()),
            "Downscaling oversized image for OCR"
        );
    }

    let (cur_w, cur_h) = gray.dimensions();
    let (new_w, new_h) = upscaled_dimensions(cur_w, cur_h);
    let gray = if (new_w, new_h) != (cur_w, cur_h) {
        tracing::debug!(
            from = format!("{cur_w}x{cur_h}"),
            to = format!("{new_w}x{new_h}"),
            "Upscaling image for OCR"
        );
        gray.resize_exact(new_w, new_h, FilterType::Lanczos3)
    } else {
        gray
    };

    encode_png(&gray)
}

/// Prepared bytes, or the original bytes when the image cannot be decoded.
pub fn prepare_or_original(image_bytes: &[u8]) -> Vec<u8> {
    match prepare_for_ocr(image_bytes) {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::warn!(error = %e, "Image preprocessing failed, using original bytes");
            image_bytes.to_vec()
        }
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}
