use std::path::Path;

use serde::Serialize;

use super::ImportError;
use crate::models::enums::FileKind;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif"];
const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// Result of upload format detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileDetection {
    pub kind: FileKind,
    pub mime_type: String,
    /// Lowercased extension, used for the stored file name.
    pub extension: String,
}

/// Map an extension to the kind it is accepted as.
pub fn kind_for_extension(extension: &str) -> Option<FileKind> {
    let ext = extension.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileKind::Image)
    } else if PDF_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileKind::Pdf)
    } else {
        None
    }
}

/// Identify the kind from magic bytes.
pub fn sniff_kind(header: &[u8]) -> Option<FileKind> {
    match header {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(FileKind::Pdf),
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some(FileKind::Image),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(FileKind::Image),
        // GIF87a / GIF89a
        [b'G', b'I', b'F', b'8', ..] => Some(FileKind::Image),
        // BMP
        [b'B', b'M', ..] => Some(FileKind::Image),
        // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some(FileKind::Image),
        _ => None,
    }
}

/// Accept a file only when its extension is allowed and its magic bytes agree.
pub fn detect_file_kind(filename: &str, header: &[u8]) -> Result<FileDetection, ImportError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let kind = kind_for_extension(&extension).ok_or_else(|| {
        ImportError::UnsupportedFileKind(if extension.is_empty() {
            filename.to_string()
        } else {
            extension.clone()
        })
    })?;

    if sniff_kind(header) != Some(kind) {
        return Err(ImportError::ContentMismatch {
            declared: kind.to_string(),
        });
    }

    let mime_type = mime_guess::from_ext(&extension)
        .first_or_octet_stream()
        .to_string();

    Ok(FileDetection {
        kind,
        mime_type,
        extension,
    })
}

/// Sanitize a filename: strip path components, limit length
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("exam");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "exam".to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn detects_pdf() {
        let detection = detect_file_kind("laudo.PDF", b"%PDF-1.4\n...").unwrap();
        assert_eq!(detection.kind, FileKind::Pdf);
        assert_eq!(detection.mime_type, "application/pdf");
        assert_eq!(detection.extension, "pdf");
    }

    #[test]
    fn detects_png_and_jpeg() {
        let png = detect_file_kind("scan.png", PNG_HEADER).unwrap();
        assert_eq!(png.kind, FileKind::Image);
        assert_eq!(png.mime_type, "image/png");

        let jpeg = detect_file_kind("scan.jpeg", &[0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        assert_eq!(jpeg.mime_type, "image/jpeg");
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = detect_file_kind("notes.docx", b"PK\x03\x04").unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFileKind(ext) if ext == "docx"));
    }

    #[test]
    fn rejects_missing_extension() {
        assert!(matches!(
            detect_file_kind("README", b"%PDF"),
            Err(ImportError::UnsupportedFileKind(_))
        ));
    }

    #[test]
    fn rejects_content_that_disagrees_with_extension() {
        let err = detect_file_kind("exam.pdf", PNG_HEADER).unwrap_err();
        assert!(matches!(err, ImportError::ContentMismatch { .. }));
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("hemograma março.pdf"), "hemograma março.pdf");
        assert_eq!(sanitize_filename(""), "exam");
    }
}
