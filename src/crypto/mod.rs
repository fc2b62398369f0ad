pub mod keys;
pub mod encryption;

pub use keys::*;
pub use encryption::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Corrupted encrypted data")]
    CorruptedData,

    #[error("Invalid key file: {0}")]
    InvalidKeyFile(String),

    #[error("Invalid encoding: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
