use std::path::{Path, PathBuf};

/// Application-level constants
pub const APP_NAME: &str = "LabTrend";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Settings key holding the external analysis credential.
pub const ANALYSIS_API_KEY_SETTING: &str = "analysis_api_key";
pub const ANALYSIS_MODEL_SETTING: &str = "analysis_model";
pub const ANALYSIS_BASE_URL_SETTING: &str = "analysis_base_url";

pub const DEFAULT_ANALYSIS_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_OCR_LANGUAGE: &str = "por";

/// Get the application data directory.
/// `LABTREND_DATA_DIR` overrides the default of ~/LabTrend/.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("LABTREND_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    "labtrend=info"
}

/// Runtime configuration, gathered once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub ocr_language: String,
    pub analysis_base_url: String,
    pub analysis_model: String,
    pub analysis_timeout_secs: u64,
    /// Optional JSON file replacing the built-in reference ranges.
    pub reference_ranges_path: Option<PathBuf>,
}

impl AppConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            ocr_language: DEFAULT_OCR_LANGUAGE.to_string(),
            analysis_base_url: DEFAULT_ANALYSIS_BASE_URL.to_string(),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            analysis_timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
            reference_ranges_path: None,
        }
    }

    /// Defaults overridden by `LABTREND_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::with_data_dir(&app_data_dir());

        if let Some(bytes) = env_parse::<u64>("LABTREND_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = bytes;
        }
        if let Ok(lang) = std::env::var("LABTREND_OCR_LANG") {
            if !lang.trim().is_empty() {
                config.ocr_language = lang.trim().to_string();
            }
        }
        if let Ok(url) = std::env::var("LABTREND_ANALYSIS_BASE_URL") {
            config.analysis_base_url = url;
        }
        if let Ok(model) = std::env::var("LABTREND_ANALYSIS_MODEL") {
            config.analysis_model = model;
        }
        if let Some(secs) = env_parse::<u64>("LABTREND_ANALYSIS_TIMEOUT_SECS") {
            config.analysis_timeout_secs = secs;
        }
        config.reference_ranges_path =
            std::env::var_os("LABTREND_REFERENCE_RANGES").map(PathBuf::from);

        config
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("labtrend.db")
    }

    pub fn settings_key_path(&self) -> PathBuf {
        self.data_dir.join("settings.key")
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}

/// External analysis service configuration.
///
/// `Unconfigured` disables the external path entirely. A configured but
/// invalid credential only shows up as a per-call soft failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisConfig {
    Unconfigured,
    Configured(AnalysisSettings),
}

#[derive(Clone, PartialEq, Eq)]
pub struct AnalysisSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for AnalysisSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AnalysisConfig {
    /// Build from an optional credential; blank credentials count as absent.
    pub fn from_credential(api_key: Option<String>, app: &AppConfig) -> Self {
        match api_key.map(|k| k.trim().to_string()) {
            Some(key) if !key.is_empty() => Self::Configured(AnalysisSettings {
                api_key: key,
                base_url: app.analysis_base_url.clone(),
                model: app.analysis_model.clone(),
                timeout_secs: app.analysis_timeout_secs,
            }),
            _ => Self::Unconfigured,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_data_dir() {
        let config = AppConfig::with_data_dir(Path::new("/var/lib/labtrend"));
        assert_eq!(config.uploads_dir(), PathBuf::from("/var/lib/labtrend/uploads"));
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/labtrend/labtrend.db"));
        assert!(config.settings_key_path().starts_with("/var/lib/labtrend"));
    }

    #[test]
    fn defaults_match_upload_limits() {
        let config = AppConfig::with_data_dir(Path::new("/tmp"));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.ocr_language, "por");
    }

    #[test]
    fn blank_credential_is_unconfigured() {
        let app = AppConfig::with_data_dir(Path::new("/tmp"));
        assert_eq!(AnalysisConfig::from_credential(None, &app), AnalysisConfig::Unconfigured);
        assert_eq!(
            AnalysisConfig::from_credential(Some("   ".into()), &app),
            AnalysisConfig::Unconfigured
        );
        assert!(AnalysisConfig::from_credential(Some("sk-1".into()), &app).is_configured());
    }

    #[test]
    fn debug_redacts_api_key() {
        let app = AppConfig::with_data_dir(Path::new("/tmp"));
        let config = AnalysisConfig::from_credential(Some("sk-secret".into()), &app);
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
    }

    #[test]
    fn app_name_is_labtrend() {
        assert_eq!(APP_NAME, "LabTrend");
    }
}
