//! Configuration Store: key/value settings with optional encryption.

use rusqlite::Connection;
use thiserror::Error;

use crate::config::{self, AnalysisConfig, AppConfig};
use crate::crypto::{CryptoError, EncryptedData, SettingsKey};
use crate::db::{self, DatabaseError};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Encryption error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Stored setting is not valid UTF-8: {0}")]
    Encoding(String),
}

/// Read access to configuration values, decrypted when needed.
pub trait ConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;
}

/// SQLite-backed store; encrypted values use AES-256-GCM under `key`.
pub struct SqliteConfigStore<'a> {
    conn: &'a Connection,
    key: &'a SettingsKey,
}

impl<'a> SqliteConfigStore<'a> {
    pub fn new(conn: &'a Connection, key: &'a SettingsKey) -> Self {
        Self { conn, key }
    }

    pub fn set(&self, name: &str, value: &str, encrypt: bool) -> Result<(), SettingsError> {
        if encrypt {
            let encrypted = self.key.encrypt(value.as_bytes())?;
            db::set_setting(self.conn, name, &encrypted.to_base64(), true)?;
        } else {
            db::set_setting(self.conn, name, value, false)?;
        }
        tracing::info!(key = name, encrypted = encrypt, "Setting stored");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), SettingsError> {
        db::delete_setting(self.conn, name)?;
        Ok(())
    }
}

impl ConfigStore for SqliteConfigStore<'_> {
    fn get(&self, name: &str) -> Result<Option<String>, SettingsError> {
        let Some(stored) = db::get_setting(self.conn, name)? else {
            return Ok(None);
        };
        if !stored.is_encrypted {
            return Ok(Some(stored.value));
        }
        let encrypted = EncryptedData::from_base64(&stored.value)?;
        let plain = self.key.decrypt(&encrypted)?;
        String::from_utf8(plain)
            .map(Some)
            .map_err(|e| SettingsError::Encoding(e.to_string()))
    }
}

/// Resolve the external analysis configuration.
///
/// The store wins over `LABTREND_ANALYSIS_API_KEY`. A store that cannot be
/// read is logged and treated as holding no credential.
pub fn resolve_analysis_config(store: &dyn ConfigStore, app: &AppConfig) -> AnalysisConfig {
    let mut app = app.clone();
    let stored_key = match store.get(config::ANALYSIS_API_KEY_SETTING) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read analysis credential from settings");
            None
        }
    };
    if let Ok(Some(model)) = store.get(config::ANALYSIS_MODEL_SETTING) {
        app.analysis_model = model;
    }
    if let Ok(Some(url)) = store.get(config::ANALYSIS_BASE_URL_SETTING) {
        app.analysis_base_url = url;
    }

    let credential = stored_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var("LABTREND_ANALYSIS_API_KEY").ok());

    let resolved = AnalysisConfig::from_credential(credential, &app);
    tracing::debug!(configured = resolved.is_configured(), "Analysis service configuration resolved");
    resolved
}
