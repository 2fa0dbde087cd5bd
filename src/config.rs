use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "RxStock";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn default_log_filter() -> &'static str {
    "rxstock=info"
}

/// Get the application data directory
/// ~/RxStock/ on all platforms (user-visible by design)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// Get the uploads directory (stored bill files)
pub fn uploads_dir() -> PathBuf {
    app_data_dir().join("uploads")
}

/// Get the default database path
pub fn database_path() -> PathBuf {
    app_data_dir().join("rxstock.db")
}

/// AI service settings for the pipeline.
///
/// The vision model drives OCR and is always used; the text model drives
/// issuer detection and structured extraction and can be switched off, in
/// which case the pipeline runs on its deterministic fallbacks.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub base_url: String,
    pub ocr_model: String,
    pub text_model: String,
    pub timeout_secs: u64,
    pub llm_enabled: bool,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            ocr_model: "llama3.2-vision".to_string(),
            text_model: "llama3.1".to_string(),
            timeout_secs: 120,
            llm_enabled: true,
        }
    }
}

impl AiSettings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("RXSTOCK_OLLAMA_URL").unwrap_or(defaults.base_url),
            ocr_model: std::env::var("RXSTOCK_OCR_MODEL").unwrap_or(defaults.ocr_model),
            text_model: std::env::var("RXSTOCK_TEXT_MODEL").unwrap_or(defaults.text_model),
            timeout_secs: std::env::var("RXSTOCK_AI_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            llm_enabled: !parse_flag(std::env::var("RXSTOCK_LLM_DISABLED").ok().as_deref()),
        }
    }
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(str::trim),
        Some("1") | Some("true") | Some("yes")
    )
}
