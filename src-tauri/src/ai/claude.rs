use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::gemini::build_http_client;
use super::{
    mask_key, RecognitionError, RecognitionProvider, RecognitionRequest, DEFAULT_JPEG_QUALITY,
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TIMEOUT_SECS,
};
use crate::capture::encode::encode_jpeg_base64;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API (`x-api-key` header auth).
pub struct ClaudeClient {
    base_url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
    jpeg_quality: u8,
    client: Client,
}

impl ClaudeClient {
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

    fn build_request_body(&self, image_b64: &str, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_output_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        {
                            "type": "image",
                            "source": { "type": "base64", "media_type": "image/jpeg", "data": image_b64 }
                        }
                    ]
                }
            ]
        })
    }
}

#[async_trait]
impl RecognitionProvider for ClaudeClient {
    async fn recognize(&self, request: &RecognitionRequest) -> Result<String, RecognitionError> {
        let image_b64 = encode_jpeg_base64(&request.image.image, self.jpeg_quality)?;
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = self.build_request_body(&image_b64, &request.prompt);

        log::info!(
            "Claude request: {} (x-api-key {})",
            url,
            mask_key(&self.api_key)
        );

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(RecognitionError::from_reqwest)?;

        let status = response.status();
        log::debug!("Claude HTTP status: {}", status);
        let text = response
            .text()
            .await
            .map_err(RecognitionError::from_reqwest)?;

        parse_response(status, &text)
    }

    fn name(&self) -> &str {
        "claude"
    }
}

/// Join every `text` block of a content array with newlines.
fn joined_text(content: &Value) -> Option<String> {
    let blocks = content.as_array()?;
    let text = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    (!text.is_empty()).then_some(text)
}

fn parse_response(status: reqwest::StatusCode, body: &str) -> Result<String, RecognitionError> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        // Gateways answer outages with HTML pages.
        Err(_) if !status.is_success() => {
            return Err(RecognitionError::Api(format!("HTTP {status}")));
        }
        Err(e) => return Err(RecognitionError::Parse(format!("invalid JSON ({e})"))),
    };

    // Messages API puts content at the top level; some proxies nest it under `message`.
    let text = parsed
        .get("content")
        .and_then(joined_text)
        .or_else(|| parsed.pointer("/message/content").and_then(joined_text));
    if let Some(text) = text {
        return Ok(text);
    }

    if let Some(message) = parsed.pointer("/error/message").and_then(|m| m.as_str()) {
        return Err(RecognitionError::Api(message.to_string()));
    }

    if !status.is_success() {
        return Err(RecognitionError::Api(format!("HTTP {status}: {body}")));
    }

    Err(RecognitionError::Parse("no text content in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_request_body_structure() {
        let client = ClaudeClient::new("k", "claude-3-5-haiku-20241022");
        let body = client.build_request_body("b64", "What is this?");

        assert_eq!(body["model"], "claude-3-5-haiku-20241022");
        assert_eq!(body["max_tokens"], json!(1024));

        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "What is this?");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["source"]["data"], "b64");
    }

    #[test]
    fn test_parse_joins_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"line one"},{"type":"tool_use","id":"x"},{"type":"text","text":"line two"}]}"#;
        assert_eq!(
            parse_response(StatusCode::OK, body).unwrap(),
            "line one\nline two"
        );
    }

    #[test]
    fn test_parse_nested_message_shape() {
        let body = r#"{"message":{"content":[{"type":"text","text":"nested"}]}}"#;
        assert_eq!(parse_response(StatusCode::OK, body).unwrap(), "nested");
    }

    #[test]
    fn test_parse_error_payload() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"quota exceeded"}}"#;
        let err = parse_response(StatusCode::TOO_MANY_REQUESTS, body).unwrap_err();
        assert_eq!(err, RecognitionError::Api("quota exceeded".into()));
    }

    #[test]
    fn test_parse_empty_content_is_parse_failure() {
        let err = parse_response(StatusCode::OK, r#"{"content":[]}"#).unwrap_err();
        assert!(matches!(err, RecognitionError::Parse(_)));
    }

    #[test]
    fn test_parse_non_json_error_body_is_api_failure() {
        let err =
            parse_response(StatusCode::SERVICE_UNAVAILABLE, "upstream connect error").unwrap_err();
        assert_eq!(
            err,
            RecognitionError::Api("HTTP 503 Service Unavailable".into())
        );
    }
}
