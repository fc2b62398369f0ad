//! External analysis configuration and connectivity check.

use serde::Serialize;

use super::CommandError;
use crate::config::{
    self, AnalysisConfig, ANALYSIS_API_KEY_SETTING, ANALYSIS_BASE_URL_SETTING, ANALYSIS_MODEL_SETTING,
};
use crate::core_state::CoreState;
use crate::pipeline::structuring::{LlmClient, OpenAiClient};

/// Settings keys that change how exams are analyzed.
const ANALYSIS_KEYS: &[&str] = &[
    ANALYSIS_API_KEY_SETTING,
    ANALYSIS_MODEL_SETTING,
    ANALYSIS_BASE_URL_SETTING,
];

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisServiceStatus {
    pub configured: bool,
    pub reachable: bool,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub error: Option<String>,
}

/// Store a setting. The analysis credential is always stored encrypted;
/// analysis keys rebuild the processor so the next run uses them.
pub fn set_config(
    state: &CoreState,
    key: &str,
    value: &str,
    encrypt: bool,
) -> Result<(), CommandError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(CommandError::InvalidInput("setting key is required".into()));
    }
    let encrypt = encrypt || key == ANALYSIS_API_KEY_SETTING;

    let conn = state.open_db()?;
    state.config_store(&conn).set(key, value, encrypt)?;
    drop(conn);

    if ANALYSIS_KEYS.contains(&key) {
        state.reload_processor()?;
    }
    Ok(())
}

pub fn remove_config(state: &CoreState, key: &str) -> Result<(), CommandError> {
    let conn = state.open_db()?;
    state.config_store(&conn).remove(key)?;
    drop(conn);

    if ANALYSIS_KEYS.contains(&key) {
        state.reload_processor()?;
    }
    Ok(())
}

/// Send a trivial prompt to the configured service.
pub fn test_analysis_service(state: &CoreState) -> Result<AnalysisServiceStatus, CommandError> {
    let conn = state.open_db()?;
    let settings = match state.analysis_config(&conn) {
        AnalysisConfig::Unconfigured => {
            return Ok(AnalysisServiceStatus {
                configured: false,
                reachable: false,
                model: None,
                base_url: None,
                error: Some(format!(
                    "No credential: set '{}' or LABTREND_ANALYSIS_API_KEY",
                    config::ANALYSIS_API_KEY_SETTING
                )),
            });
        }
        AnalysisConfig::Configured(settings) => settings,
    };

    let outcome = OpenAiClient::new(&settings).and_then(|client| client.check_connection());
    if let Err(e) = &outcome {
        tracing::warn!(error = %e, "Analysis service check failed");
    }

    Ok(AnalysisServiceStatus {
        configured: true,
        reachable: outcome.is_ok(),
        model: Some(settings.model),
        base_url: Some(settings.base_url),
        error: outcome.err().map(|e| e.to_string()),
    })
}
