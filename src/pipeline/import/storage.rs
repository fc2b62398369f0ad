use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use super::format::{detect_file_kind, sanitize_filename};
use super::hash::compute_checksum;
use super::ImportError;
use crate::models::enums::FileKind;
use crate::models::StoredFile;

/// Disk usage of the uploads folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub file_count: u64,
    pub total_bytes: u64,
    pub patient_folders: u64,
}

/// Folder holding one patient's uploads.
pub fn patient_upload_dir(uploads_dir: &Path, patient_id: &Uuid) -> PathBuf {
    uploads_dir.join(format!("patient_{patient_id}"))
}

/// Read an upload from a local path.
pub fn read_source(source_path: &Path) -> Result<Vec<u8>, ImportError> {
    if !source_path.is_file() {
        return Err(ImportError::SourceNotFound(source_path.to_path_buf()));
    }
    Ok(std::fs::read(source_path)?)
}

/// Validate an upload and write it to `uploads/patient_<id>/<uuid>.<ext>`.
///
/// `declared_kind` is the caller's kind tag; when present it must agree with
/// what the bytes are.
pub fn store_upload(
    uploads_dir: &Path,
    patient_id: &Uuid,
    original_filename: &str,
    content: &[u8],
    max_bytes: u64,
    declared_kind: Option<FileKind>,
) -> Result<StoredFile, ImportError> {
    if content.is_empty() {
        return Err(ImportError::EmptyFile);
    }
    if content.len() as u64 > max_bytes {
        return Err(ImportError::FileTooLarge {
            size_mb: content.len() as f64 / (1024.0 * 1024.0),
            max_mb: max_bytes as f64 / (1024.0 * 1024.0),
        });
    }

    let original_filename = sanitize_filename(original_filename);
    let detection = detect_file_kind(&original_filename, &content[..content.len().min(16)])?;
    if let Some(declared) = declared_kind {
        if declared != detection.kind {
            return Err(ImportError::ContentMismatch {
                declared: declared.to_string(),
            });
        }
    }

    let target_dir = patient_upload_dir(uploads_dir, patient_id);
    std::fs::create_dir_all(&target_dir)?;
    let stored_path = target_dir.join(format!("{}.{}", Uuid::new_v4(), detection.extension));
    std::fs::write(&stored_path, content)?;

    tracing::debug!(
        patient_id = %patient_id,
        size = content.len(),
        kind = detection.kind.as_str(),
        "Upload stored"
    );

    Ok(StoredFile {
        original_filename,
        stored_path,
        size_bytes: content.len() as u64,
        kind: detection.kind,
        mime_type: detection.mime_type,
        checksum: compute_checksum(content),
    })
}

/// Remove a stored upload. A file that is already gone is not an error.
pub fn remove_stored_file(path: &Path) -> Result<(), ImportError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Count files and bytes under the uploads folder (two levels deep).
pub fn storage_stats(uploads_dir: &Path) -> Result<StorageStats, ImportError> {
    let mut stats = StorageStats::default();
    if !uploads_dir.exists() {
        return Ok(stats);
    }

    for entry in std::fs::read_dir(uploads_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        stats.patient_folders += 1;
        for file in std::fs::read_dir(entry.path())? {
            let file = file?;
            let meta = file.metadata()?;
            if meta.is_file() {
                stats.file_count += 1;
                stats.total_bytes += meta.len();
            }
        }
    }
    Ok(stats)
}
