//! Google Gemini gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use tree_core::config::{TreeConfig, DEFAULT_API_BASE, DEFAULT_MODEL};

use crate::error::{CompletionError, Result};
use crate::gateway::{Completion, CompletionGateway, CompletionRequest};
use crate::protocol::gemini::{
    GenerateContentRequest, GenerateContentResponse, GeminiErrorBody, GenerationConfig,
};
use crate::redact::redact_secret;

/// Google Gemini `generateContent` gateway.
pub struct GeminiGateway {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiGateway {
    /// Create a gateway with an API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: Some(api_key.into()).filter(|k: &String| !k.is_empty()),
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_output_tokens: 8192,
        }
    }

    /// Build from configuration, applying the request timeout.
    pub fn from_config(config: &TreeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CompletionError::network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    /// Set a custom base URL (e.g., for proxies or tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, model: &str, api_key: &str) -> String {
        format!("{}/models/{}:generateContent?key={}", self.base_url, model, api_key)
    }

    fn redact(&self, text: &str) -> String {
        redact_secret(text, self.api_key.as_deref())
    }

    fn status_error(&self, status: StatusCode, body: &str) -> CompletionError {
        let reported = serde_json::from_str::<GeminiErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message.or(e.status))
            .unwrap_or_else(|| format!("Gemini API request failed ({})", status.as_u16()));
        let message = self.redact(&reported);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::auth(message),
            StatusCode::TOO_MANY_REQUESTS => CompletionError::quota(message),
            _ => CompletionError::provider(message),
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> CompletionError {
        if error.is_timeout() {
            return CompletionError::network("request timed out");
        }
        CompletionError::network(self.redact(&error.without_url().to_string()))
    }
}

#[async_trait]
impl CompletionGateway for GeminiGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(CompletionError::auth("Gemini API key not configured"));
        };
        let model = request.model.as_deref().unwrap_or(&self.model);
        if request.model.is_some() {
            debug!("Gemini gateway using override model '{}' (default: '{}')", model, self.model);
        }

        let body = GenerateContentRequest::from_request(
            &request,
            GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        );
        debug!(
            contents = body.contents.len(),
            heritage_chars = request.heritage.len(),
            "sending Gemini request"
        );

        let response = self
            .client
            .post(self.endpoint(model, api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(self.status_error(status, &text));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| CompletionError::malformed(format!("invalid Gemini response: {}", e)))?;
        let (content, finish_reason) = parsed
            .first_text()
            .ok_or_else(|| CompletionError::malformed("Gemini response has no candidates"))?;

        let content = content.trim();
        if content.is_empty() {
            return Err(match finish_reason {
                Some(reason) => CompletionError::empty(format!("Generation stopped: {}", reason)),
                None => CompletionError::empty("Gemini returned an empty response"),
            });
        }

        debug!(chars = content.len(), "Gemini completion received");
        Ok(Completion {
            text: content.to_string(),
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_gateway() {
        let gateway = GeminiGateway::new("test_key");
        assert_eq!(gateway.api_key.as_deref(), Some("test_key"));
        assert_eq!(gateway.base_url, DEFAULT_API_BASE);
        assert_eq!(gateway.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_chained_builders() {
        let gateway = GeminiGateway::new("test_key")
            .with_base_url("https://custom.api.com/")
            .with_model("gemini-ultra");
        assert_eq!(gateway.base_url, "https://custom.api.com");
        assert_eq!(gateway.model(), "gemini-ultra");
    }

    #[test]
    fn test_endpoint() {
        let gateway = GeminiGateway::new("k").with_base_url("https://test.api.com/v1beta");
        assert_eq!(
            gateway.endpoint("gemini-custom", "my_key"),
            "https://test.api.com/v1beta/models/gemini-custom:generateContent?key=my_key"
        );
    }

    #[test]
    fn test_from_config() {
        let config = TreeConfig {
            api_key: Some("cfg_key".into()),
            model: "gemini-2.0-flash".into(),
            ..TreeConfig::default()
        };
        let gateway = GeminiGateway::from_config(&config).unwrap();
        assert_eq!(gateway.model(), "gemini-2.0-flash");
        assert_eq!(gateway.api_key.as_deref(), Some("cfg_key"));
    }

    #[test]
    fn test_status_mapping() {
        let gateway = GeminiGateway::new("SECRET");
        let body = r#"{"error": {"message": "API key SECRET not valid", "status": "INVALID_ARGUMENT"}}"#;
        let err = gateway.status_error(StatusCode::FORBIDDEN, body);
        assert_eq!(err.kind, crate::ErrorKind::Auth);
        assert_eq!(err.message, "API key *** not valid");

        let err = gateway.status_error(StatusCode::TOO_MANY_REQUESTS, "not json");
        assert_eq!(err.kind, crate::ErrorKind::Quota);
        assert_eq!(err.message, "Gemini API request failed (429)");

        let err = gateway.status_error(StatusCode::INTERNAL_SERVER_ERROR, "{}");
        assert_eq!(err.kind, crate::ErrorKind::Provider);
    }
}
