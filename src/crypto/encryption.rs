use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::keys::KEY_LENGTH;
use super::CryptoError;

const NONCE_LENGTH: usize = 12;

/// Encrypted data container: nonce + ciphertext (includes AES-GCM auth tag)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Encrypt plaintext using AES-256-GCM with a random nonce
    pub(crate) fn encrypt(key_bytes: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<Self, CryptoError> {
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        let cipher = Aes256Gcm::new(key);

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(Self {
            nonce: nonce_bytes,
            ciphertext,
        })
    }

    /// Decrypt ciphertext using AES-256-GCM
    pub(crate) fn decrypt(&self, key_bytes: &[u8; KEY_LENGTH]) -> Result<Vec<u8>, CryptoError> {
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(&self.nonce);

        cipher
            .decrypt(nonce, self.ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Serialize to bytes: [12-byte nonce][ciphertext...]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NONCE_LENGTH + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Deserialize from bytes: [12-byte nonce][ciphertext...]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < NONCE_LENGTH + 16 {
            // AES-GCM auth tag is 16 bytes minimum
            return Err(CryptoError::CorruptedData);
        }

        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&bytes[..NONCE_LENGTH]);
        let ciphertext = bytes[NONCE_LENGTH..].to_vec();

        Ok(Self { nonce, ciphertext })
    }

    /// Text form for storage in a settings row.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}
