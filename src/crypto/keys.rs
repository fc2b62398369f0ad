use std::path::Path;

use zeroize::Zeroize;

use super::encryption::EncryptedData;
use super::CryptoError;

pub const KEY_LENGTH: usize = 32; // AES-256

/// Key protecting encrypted settings. Zeroed on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SettingsKey {
    pub(super) key_bytes: [u8; KEY_LENGTH],
}

impl SettingsKey {
    /// Fresh random key.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key_bytes = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        Self { key_bytes }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LENGTH {
            return Err(CryptoError::InvalidKeyFile(format!(
                "expected {KEY_LENGTH} bytes, found {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_LENGTH];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { key_bytes })
    }

    /// Load the key file, creating it with a random key on first use.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let mut bytes = std::fs::read(path)?;
            let key = Self::from_bytes(&bytes);
            bytes.zeroize();
            return key;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let key = Self::generate();
        std::fs::write(path, key.key_bytes)?;
        restrict_permissions(path)?;
        tracing::info!(path = %path.display(), "Generated settings encryption key");
        Ok(key)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedData, CryptoError> {
        EncryptedData::encrypt(&self.key_bytes, plaintext)
    }

    pub fn decrypt(&self, encrypted: &EncryptedData) -> Result<Vec<u8>, CryptoError> {
        encrypted.decrypt(&self.key_bytes)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), CryptoError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), CryptoError> {
    Ok(())
}
