use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tauri::Manager;

use crate::ai::{
    ProviderKind, DEFAULT_EXTRACTION_PROMPT, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_OUTPUT_TOKENS,
    DEFAULT_TIMEOUT_SECS,
};
use crate::pipeline::Pipeline;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("No API key configured for {provider:?}: set {env_var} or add apiKey to settings.toml")]
    MissingApiKey {
        provider: ProviderKind,
        env_var: &'static str,
    },
    #[error("Settings I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config directory unavailable: {0}")]
    ConfigDir(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub provider: ProviderKind,
    pub api_key: String,
    pub gemini_model: String,
    pub claude_model: String,
    pub max_output_tokens: u32,
    pub jpeg_quality: u8,
    pub request_timeout_secs: u64,
    pub banner_duration_ms: u64,
    pub ocr_language: String,
    pub capture_shortcut: String,
    pub prompt_shortcut: String,
    pub extraction_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            api_key: String::new(),
            gemini_model: "gemini-2.0-flash".into(),
            claude_model: "claude-3-5-haiku-20241022".into(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            banner_duration_ms: 2500,
            ocr_language: "eng".into(),
            capture_shortcut: "alt+super+3".into(),
            prompt_shortcut: "super+2".into(),
            extraction_prompt: DEFAULT_EXTRACTION_PROMPT.into(),
        }
    }
}

impl Settings {
    /// Pick the API key: provider env var first, then the stored key.
    pub fn resolve_api_key(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, SettingsError> {
        let env_var = self.provider.env_var();
        if let Some(key) = env(env_var).filter(|k| !k.trim().is_empty()) {
            log::info!("API key found in {}", env_var);
            return Ok(key);
        }
        if !self.api_key.trim().is_empty() {
            return Ok(self.api_key.clone());
        }
        Err(SettingsError::MissingApiKey {
            provider: self.provider,
            env_var,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load settings from the app config directory (non-command helper).
    pub fn load_from_app(app: &tauri::AppHandle) -> Result<Self, SettingsError> {
        let path = config_path(app)?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_toml(&fs::read_to_string(&path)?)
    }
}

pub fn config_path(app: &tauri::AppHandle) -> Result<PathBuf, SettingsError> {
    let dir = app
        .path()
        .app_config_dir()
        .map_err(|e| SettingsError::ConfigDir(e.to_string()))?;
    fs::create_dir_all(&dir)?;
    Ok(dir.join("settings.toml"))
}

/// Process environment lookup used outside tests.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[tauri::command]
pub async fn save_settings(
    app: tauri::AppHandle,
    pipeline: tauri::State<'_, std::sync::Arc<Pipeline>>,
    settings: Settings,
) -> Result<(), String> {
    let path = config_path(&app).map_err(|e| e.to_string())?;
    let content = settings.to_toml().map_err(|e| e.to_string())?;
    fs::write(&path, content).map_err(|e| e.to_string())?;
    log::info!("Settings saved to {}", path.display());

    pipeline.apply_settings(&settings, process_env);
    Ok(())
}

#[tauri::command]
pub async fn load_settings(app: tauri::AppHandle) -> Result<Settings, String> {
    Settings::load_from_app(&app).map_err(|e| e.to_string())
}
