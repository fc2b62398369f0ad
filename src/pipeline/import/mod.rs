pub mod format;
pub mod hash;
pub mod storage;

pub use format::*;
pub use hash::*;
pub use storage::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Unsupported file kind: {0}")]
    UnsupportedFileKind(String),

    #[error("File content does not match its {declared} type")]
    ContentMismatch { declared: String },

    #[error("File is empty")]
    EmptyFile,

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb:.1}MB limit")]
    FileTooLarge { size_mb: f64, max_mb: f64 },
}
