use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    mask_key, RecognitionError, RecognitionProvider, RecognitionRequest, DEFAULT_JPEG_QUALITY,
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TIMEOUT_SECS,
};
use crate::capture::encode::encode_jpeg_base64;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for the Gemini `generateContent` endpoint. The API key travels as
/// the `key` query parameter.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
    jpeg_quality: u8,
    client: Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            client: build_http_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Point the client at another host (local test servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_http_client(timeout);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    fn endpoint(&self) -> Result<url::Url, RecognitionError> {
        let raw = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        url::Url::parse_with_params(&raw, &[("key", self.api_key.as_str())])
            .map_err(|e| RecognitionError::Api(format!("Invalid API URL: {e}")))
    }

    fn build_request_body(&self, image_b64: &str, prompt: &str) -> Value {
        json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        { "text": prompt },
                        { "inline_data": { "mime_type": "image/jpeg", "data": image_b64 } }
                    ]
                }
            ],
            "generationConfig": {
                "maxOutputTokens": self.max_output_tokens
            }
        })
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        })
}

#[async_trait]
impl RecognitionProvider for GeminiClient {
    async fn recognize(&self, request: &RecognitionRequest) -> Result<String, RecognitionError> {
        let image_b64 = encode_jpeg_base64(&request.image.image, self.jpeg_quality)?;
        let url = self.endpoint()?;
        let body = self.build_request_body(&image_b64, &request.prompt);

        log::info!(
            "Gemini request: {}",
            url.as_str().replace(&self.api_key, &mask_key(&self.api_key))
        );

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(RecognitionError::from_reqwest)?;

        let status = response.status();
        log::debug!("Gemini HTTP status: {}", status);
        let text = response
            .text()
            .await
            .map_err(RecognitionError::from_reqwest)?;

        parse_response(status, &text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Map a Gemini response body to extracted text or a classified error.
pub(crate) fn parse_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<String, RecognitionError> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        // Gateways answer outages with HTML pages.
        Err(_) if !status.is_success() => {
            return Err(RecognitionError::Api(format!("HTTP {status}")));
        }
        Err(e) => return Err(RecognitionError::Parse(format!("invalid JSON ({e})"))),
    };

    if let Some(text) = parsed
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(|t| t.as_str())
    {
        return Ok(text.to_string());
    }

    if let Some(message) = parsed.pointer("/error/message").and_then(|m| m.as_str()) {
        return Err(RecognitionError::Api(message.to_string()));
    }

    if !status.is_success() {
        return Err(RecognitionError::Api(format!("HTTP {status}: {body}")));
    }

    Err(RecognitionError::Parse("no text candidate in response".into()))
}
