//! Shared application state for commands.
//!
//! Holds the runtime configuration, the settings encryption key and the
//! exam processor. Connections are opened per operation; the processor sits
//! behind an `RwLock<Arc<_>>` so detached reprocess threads keep their own
//! handle while a configuration change swaps in a rebuilt one.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use rusqlite::Connection;

use crate::config::{AnalysisConfig, AppConfig};
use crate::crypto::{CryptoError, SettingsKey};
use crate::db;
use crate::pipeline::processor::{build_processor, ExamProcessor, ProcessingError};
use crate::settings::{resolve_analysis_config, SqliteConfigStore};

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub config: AppConfig,
    settings_key: SettingsKey,
    processor: RwLock<Arc<ExamProcessor>>,
}

impl CoreState {
    /// Load the key, migrate the database and build the processor from the
    /// stored analysis configuration.
    pub fn new(config: AppConfig) -> Result<Self, CoreError> {
        let settings_key = SettingsKey::load_or_create(&config.settings_key_path())?;
        let conn = db::open_database(&config.database_path())?;
        let analysis = resolve_analysis_config(&SqliteConfigStore::new(&conn, &settings_key), &config);
        let processor = build_processor(&config, &analysis)?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            external_analysis = analysis.is_configured(),
            "Core state ready"
        );
        Ok(Self::with_processor(config, settings_key, processor))
    }

    /// Assemble from parts. Used by tests to inject mock engines.
    pub fn with_processor(config: AppConfig, settings_key: SettingsKey, processor: ExamProcessor) -> Self {
        Self {
            config,
            settings_key,
            processor: RwLock::new(Arc::new(processor)),
        }
    }

    /// Open a connection to the application database.
    pub fn open_db(&self) -> Result<Connection, CoreError> {
        db::open_database(&self.config.database_path()).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> PathBuf {
        self.config.database_path()
    }

    /// Current processor handle.
    pub fn processor(&self) -> Result<Arc<ExamProcessor>, CoreError> {
        let guard = self.processor.read().map_err(|_| CoreError::LockPoisoned)?;
        Ok(Arc::clone(&guard))
    }

    /// Configuration store over `conn`, encrypting with the settings key.
    pub fn config_store<'a>(&'a self, conn: &'a Connection) -> SqliteConfigStore<'a> {
        SqliteConfigStore::new(conn, &self.settings_key)
    }

    pub fn analysis_config(&self, conn: &Connection) -> AnalysisConfig {
        resolve_analysis_config(&self.config_store(conn), &self.config)
    }

    /// Rebuild the processor after a configuration change. Runs already in
    /// flight finish with the handle they hold.
    pub fn reload_processor(&self) -> Result<(), CoreError> {
        let conn = self.open_db()?;
        let analysis = self.analysis_config(&conn);
        let rebuilt = Arc::new(build_processor(&self.config, &analysis)?);

        let mut guard = self.processor.write().map_err(|_| CoreError::LockPoisoned)?;
        *guard = rebuilt;
        tracing::info!(external_analysis = analysis.is_configured(), "Exam processor rebuilt");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Settings key error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Processor setup failed: {0}")]
    Processor(#[from] ProcessingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_creates_key_and_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::with_data_dir(dir.path());
        let state = CoreState::new(config).unwrap();

        assert!(state.config.settings_key_path().exists());
        assert!(state.db_path().exists());
        let conn = state.open_db().unwrap();
        assert!(db::count_tables(&conn).unwrap() >= 3);
    }

    #[test]
    fn reload_picks_up_stored_credential() {
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::new(AppConfig::with_data_dir(dir.path())).unwrap();
        assert!(!state.processor().unwrap().has_external_analysis());

        let conn = state.open_db().unwrap();
        state
            .config_store(&conn)
            .set(crate::config::ANALYSIS_API_KEY_SETTING, "sk-test", true)
            .unwrap();
        state.reload_processor().unwrap();

        assert!(state.processor().unwrap().has_external_analysis());
    }

    #[test]
    fn held_processor_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::new(AppConfig::with_data_dir(dir.path())).unwrap();
        let held = state.processor().unwrap();
        state.reload_processor().unwrap();
        assert!(!Arc::ptr_eq(&held, &state.processor().unwrap()));
    }
}
