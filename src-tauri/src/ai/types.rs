use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::capture::CapturedImage;

/// Instruction used for plain text extraction.
pub const DEFAULT_EXTRACTION_PROMPT: &str = "Please analyze this image and extract all the text. \
Format the text properly maintaining the structure, layout, indentation and heading hierarchy. \
For code snippets, preserve the indentation, and remove the line numbers and other UI elements, only keep the actual code. \
For diagrams, convert them to mermaid format and give the mermaid code only. \
For tables, maintain the tabular format. \
Do not give any explanation or any extra information. Only the required content.";

/// Output token ceiling sent with every request.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

/// JPEG quality used when inlining the capture (0.7 compression factor).
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// HTTP timeout for one recognition call, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// One image paired with one instruction. Lives for the duration of a single call.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub image: Arc<CapturedImage>,
    pub prompt: String,
}

impl RecognitionRequest {
    pub fn new(image: Arc<CapturedImage>, prompt: impl Into<String>) -> Self {
        Self {
            image,
            prompt: prompt.into(),
        }
    }
}

/// Error type for cloud recognition.
///
/// The pipeline branches on [`RecognitionError::is_transport`]: only
/// connectivity failures fall back to local OCR.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("Failed to convert image: {0}")]
    ImageEncoding(String),
    #[error("Network error: {0}")]
    Transport(String),
    #[error("{0}")]
    Api(String),
    #[error("Failed to parse API response: {0}")]
    Parse(String),
}

impl RecognitionError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RecognitionError::Transport(_))
    }

    /// Classify a reqwest failure. Anything that means "we never got a
    /// response" is transport; the rest is reported as an API failure.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
            RecognitionError::Transport(e.to_string())
        } else {
            RecognitionError::Api(e.to_string())
        }
    }
}

/// Which cloud provider backs recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Claude,
}

impl ProviderKind {
    /// Environment variable that overrides the stored API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GOOGLE_API_KEY",
            ProviderKind::Claude => "ANTHROPIC_API_KEY",
        }
    }
}
