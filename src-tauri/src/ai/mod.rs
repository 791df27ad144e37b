use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod claude;
pub mod gemini;
pub mod types;
pub use types::*;

use crate::settings::{Settings, SettingsError};

/// Trait for cloud vision providers (Gemini, Claude).
/// Each provider maps a [`RecognitionRequest`] to its own wire format and
/// back to plain text.
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Send the image and instruction to the provider and return the answer text.
    async fn recognize(&self, request: &RecognitionRequest) -> Result<String, RecognitionError>;

    /// Provider name for logging/display
    fn name(&self) -> &str;
}

/// Build the provider selected in `settings`.
///
/// `env` looks up environment variables; it is a parameter so tests can run
/// without touching the process environment. Fails closed when no key is
/// available.
pub fn build_provider(
    settings: &Settings,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn RecognitionProvider>, SettingsError> {
    let api_key = settings.resolve_api_key(env)?;
    let timeout = Duration::from_secs(settings.request_timeout_secs);

    let provider: Arc<dyn RecognitionProvider> = match settings.provider {
        ProviderKind::Gemini => Arc::new(
            gemini::GeminiClient::new(api_key, &settings.gemini_model)
                .with_timeout(timeout)
                .with_max_output_tokens(settings.max_output_tokens)
                .with_jpeg_quality(settings.jpeg_quality),
        ),
        ProviderKind::Claude => Arc::new(
            claude::ClaudeClient::new(api_key, &settings.claude_model)
                .with_timeout(timeout)
                .with_max_output_tokens(settings.max_output_tokens)
                .with_jpeg_quality(settings.jpeg_quality),
        ),
    };
    log::info!("Recognition provider configured: {}", provider.name());
    Ok(provider)
}

/// Mask an API key for logs, keeping only a short prefix.
pub(crate) fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}...")
}
